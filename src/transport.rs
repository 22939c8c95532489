use crate::errors::{Error, Result, TransportError};
use crate::params::{Method, OpaqueParams};
use crate::response;
use crate::transaction::{RequestTransaction, TransactionSource};
use reqwest::header::CONTENT_TYPE;
use reqwest::{IntoUrl, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Options shared by [`DeviceClient`](crate::DeviceClient) and
/// [`ManagementClient`](crate::ManagementClient) constructors.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Deadline applied to every HTTP round-trip, including connecting,
    /// sending and reading the body. Exceeding it surfaces as
    /// [`TransportError::Timeout`](crate::TransportError::Timeout).
    pub timeout: Duration,
    /// Source of the `ClientID`/`ClientTransactionID` pair.
    pub transactions: Arc<TransactionSource>,
}

impl ClientOptions {
    /// Default per-call timeout (5 seconds).
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Self::DEFAULT_TIMEOUT,
            transactions: TransactionSource::process_wide(),
        }
    }
}

#[derive(Debug, Serialize)]
struct RequestWithTransaction<'req> {
    #[serde(flatten)]
    transaction: RequestTransaction,
    #[serde(flatten)]
    params: &'req OpaqueParams,
}

/// One HTTP binding to a server: a reused connection pool, a base URL and a
/// transaction source.
///
/// Cloning (or [`join`](Self::join)-ing) keeps sharing the pool, so all
/// clients derived from one binding reuse kept-alive connections to the same
/// `host:port`.
#[derive(Debug, Clone)]
pub(crate) struct RawClient {
    http: reqwest::Client,
    base_url: Url,
    transactions: Arc<TransactionSource>,
}

impl RawClient {
    pub(crate) fn new(
        base_url: impl IntoUrl,
        options: ClientOptions,
    ) -> Result<Self, TransportError> {
        let base_url = base_url.into_url().map_err(TransportError::from)?;
        if base_url.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl(format!(
                "{base_url} is not a valid base URL"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .build()
            .map_err(TransportError::from)?;
        Ok(Self {
            http,
            base_url,
            transactions: options.transactions,
        })
    }

    /// Derive a binding for a path under this one, sharing the connection
    /// pool and transaction source.
    pub(crate) fn join(&self, path: &str) -> Result<Self, TransportError> {
        Ok(Self {
            http: self.http.clone(),
            base_url: self.join_url(path)?,
            transactions: Arc::clone(&self.transactions),
        })
    }

    fn join_url(&self, path: &str) -> Result<Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|err| TransportError::InvalidUrl(format!("{path:?}: {err}")))
    }

    /// Issue one member access and decode the enveloped result.
    pub(crate) async fn request<R: DeserializeOwned + 'static>(
        &self,
        method: Method,
        path: &str,
        params: OpaqueParams,
    ) -> Result<R> {
        let transaction = self.transactions.next();

        let span = tracing::debug_span!(
            "alpaca_request",
            ?method,
            path,
            client_id = transaction.client_id,
            client_transaction_id = transaction.client_transaction_id,
        );

        async move {
            let result = self.execute::<R>(method, path, &params, transaction).await;
            if let Err(err) = &result {
                tracing::debug!(%err, "Alpaca request failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute<R: DeserializeOwned + 'static>(
        &self,
        method: Method,
        path: &str,
        params: &OpaqueParams,
        transaction: RequestTransaction,
    ) -> Result<R> {
        let url = self.join_url(path)?;
        let with_transaction = RequestWithTransaction {
            transaction,
            params,
        };
        let request = match method {
            Method::Get => self.http.get(url).query(&with_transaction),
            Method::Put => self.http.put(url).form(&with_transaction),
        };

        let response = request.send().await.map_err(TransportError::from)?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status,
                url: response.url().clone(),
            }
            .into());
        }
        response::check_json_content_type(response.headers().get(CONTENT_TYPE))?;
        let bytes = response.bytes().await.map_err(TransportError::from)?;

        let (response_transaction, result) = response::decode_envelope::<R>(&bytes)?;

        tracing::debug!(
            server_transaction_id = response_transaction.server_transaction_id,
            "Received response",
        );
        match response_transaction.client_transaction_id {
            Some(received) if received != transaction.client_transaction_id => {
                tracing::warn!(
                    sent = transaction.client_transaction_id,
                    received,
                    "ClientTransactionID mismatch",
                );
            }
            _ => {}
        }

        result.map_err(Error::Device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::params::params;
    use crate::test_server::{FakeServer, device_error, ok_value};
    use axum::Router;
    use axum::routing::get;
    use std::net::Ipv4Addr;

    fn test_options() -> ClientOptions {
        ClientOptions {
            transactions: Arc::new(TransactionSource::starting_at(77, 1)),
            ..ClientOptions::default()
        }
    }

    fn client_for(addr: std::net::SocketAddr) -> RawClient {
        RawClient::new(format!("http://{addr}/"), test_options()).expect("client setup failed")
    }

    #[tokio::test]
    async fn get_decodes_value_and_sends_transaction_ids() -> eyre::Result<()> {
        let server = FakeServer::start().await?;
        server.stub("GET", "name", ok_value("Simulator".into()));

        let client = client_for(server.addr);
        let name: String = client
            .request(Method::Get, "api/v1/telescope/0/name", params! {})
            .await?;
        assert_eq!(name, "Simulator");

        let name: String = client
            .request(Method::Get, "api/v1/telescope/0/name", params! {})
            .await?;
        assert_eq!(name, "Simulator");

        let requests = server.requests();
        assert!(requests[0].contains("ClientID=77"));
        assert!(requests[0].contains("ClientTransactionID=1"));
        assert!(requests[1].contains("ClientTransactionID=2"));
        Ok(())
    }

    #[tokio::test]
    async fn put_sends_form_params() -> eyre::Result<()> {
        let server = FakeServer::start().await?;
        server.stub("PUT", "connected", ok_value(serde_json::Value::Null));

        let client = client_for(server.addr);
        client
            .request::<()>(
                Method::Put,
                "api/v1/telescope/0/connected",
                params! { "Connected": true },
            )
            .await?;

        let requests = server.requests();
        assert!(requests[0].starts_with("PUT connected"));
        assert!(requests[0].contains("Connected=True"));
        assert!(requests[0].contains("ClientID=77"));
        Ok(())
    }

    #[tokio::test]
    async fn protocol_error_becomes_device_error() -> eyre::Result<()> {
        let server = FakeServer::start().await?;
        server.stub("GET", "altitude", device_error(0x407, "not connected"));

        let client = client_for(server.addr);
        let err = client
            .request::<f64>(Method::Get, "api/v1/telescope/0/altitude", params! {})
            .await
            .expect_err("expected device error");
        let err = err.as_device_error().expect("expected protocol error");
        assert_eq!(err.kind(), ErrorKind::NotConnected);
        assert_eq!(err.message, "not connected");
        Ok(())
    }

    #[tokio::test]
    async fn http_error_status_is_a_transport_error() -> eyre::Result<()> {
        // A router with no routes 404s everything.
        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        drop(tokio::spawn(async move {
            axum::serve(listener, Router::new()).await
        }));

        let err = client_for(addr)
            .request::<bool>(Method::Get, "api/v1/telescope/0/connected", params! {})
            .await
            .expect_err("expected status error");
        assert!(matches!(
            err,
            Error::Transport(TransportError::Status { status, .. })
                if status == reqwest::StatusCode::NOT_FOUND
        ));
        Ok(())
    }

    #[tokio::test]
    async fn slow_server_times_out() -> eyre::Result<()> {
        let app = Router::new().route(
            "/api/v1/telescope/0/connected",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "too late"
            }),
        );
        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        drop(tokio::spawn(async move { axum::serve(listener, app).await }));

        let options = ClientOptions {
            timeout: Duration::from_millis(200),
            ..test_options()
        };
        let client = RawClient::new(format!("http://{addr}/"), options)?;
        let err = client
            .request::<bool>(Method::Get, "api/v1/telescope/0/connected", params! {})
            .await
            .expect_err("expected timeout");
        assert!(matches!(
            err,
            Error::Transport(TransportError::Timeout(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn non_json_body_is_malformed_response() -> eyre::Result<()> {
        let app = Router::new().route(
            "/api/v1/telescope/0/connected",
            get(|| async {
                (
                    [(axum::http::header::CONTENT_TYPE, "application/json")],
                    "surprise!",
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        drop(tokio::spawn(async move { axum::serve(listener, app).await }));

        let err = client_for(addr)
            .request::<bool>(Method::Get, "api/v1/telescope/0/connected", params! {})
            .await
            .expect_err("expected parse failure");
        assert!(matches!(
            err,
            Error::Transport(TransportError::MalformedResponse(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn non_json_content_type_is_rejected() -> eyre::Result<()> {
        let app = Router::new().route(
            "/api/v1/telescope/0/connected",
            get(|| async { "plain text" }),
        );
        let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await?;
        let addr = listener.local_addr()?;
        drop(tokio::spawn(async move { axum::serve(listener, app).await }));

        let err = client_for(addr)
            .request::<bool>(Method::Get, "api/v1/telescope/0/connected", params! {})
            .await
            .expect_err("expected content-type rejection");
        assert!(matches!(
            err,
            Error::Transport(TransportError::UnexpectedContentType { .. })
        ));
        Ok(())
    }
}
