use indexmap::IndexMap;
use serde::Serialize;

/// HTTP method an Alpaca member access maps to.
///
/// Property gets and parameterless method calls use `Get` with a query
/// string; property puts and methods with side effects use `Put` with a
/// form-encoded body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Method {
    Get,
    Put,
}

/// Conversion of a parameter value into its Alpaca wire form.
///
/// The Alpaca protocol transmits all parameters as strings; booleans use the
/// capitalized `True`/`False` spelling.
pub trait AlpacaParam {
    /// Encode the value as an Alpaca parameter string.
    fn encode(self) -> String;
}

impl AlpacaParam for String {
    fn encode(self) -> String {
        self
    }
}

impl AlpacaParam for &str {
    fn encode(self) -> String {
        self.to_owned()
    }
}

impl AlpacaParam for bool {
    fn encode(self) -> String {
        (if self { "True" } else { "False" }).to_owned()
    }
}

macro_rules! simple_alpaca_param {
    ($($ty:ty),*) => {
        $(
            impl AlpacaParam for $ty {
                fn encode(self) -> String {
                    ToString::to_string(&self)
                }
            }
        )*
    };
}

simple_alpaca_param!(i32, u32, f64);

/// Untyped member parameters, in insertion order.
///
/// Serialized into the query string of a GET or the form body of a PUT,
/// alongside the `ClientID`/`ClientTransactionID` pair.
#[derive(Debug, Default, Serialize)]
#[serde(transparent)]
pub struct OpaqueParams(IndexMap<String, String>);

impl OpaqueParams {
    /// Create an empty parameter map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, returning the map for chaining.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl AlpacaParam) -> Self {
        let _ = self.0.insert(name.into(), value.encode());
        self
    }

    /// Number of parameters.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

macro_rules! params {
    ($($name:literal: $value:expr),* $(,)?) => {
        $crate::params::OpaqueParams::new()$(.with($name, $value))*
    };
}
pub(crate) use params;
