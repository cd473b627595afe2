//! HTTP server.
//!
//! This module contains the HTTP server of radio-tuner, which is a web server
//! implemented using [`axum`]. It exposes the radio configuration as a JSON
//! API, and as a plain text page for use from a browser or `curl`. It can also
//! send UDP test packets on request.

use crate::app::AppState;
use anyhow::Result;
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

mod radio;
mod test_packets;
mod version;

/// HTTP server.
#[derive(Debug)]
pub struct Server {
    server: axum::serve::Serve<Router, Router>,
}

impl Server {
    /// Creates a new HTTP server.
    ///
    /// The `address` parameter gives the address in which the server will
    /// listen. Radio configuration requests are handled with the configurator
    /// in `state`.
    ///
    /// After calling this function, the server needs to be run by calling
    /// [`Server::run`].
    pub async fn new(address: &std::net::SocketAddr, state: AppState) -> Result<Server> {
        tracing::info!(%address, "starting HTTP server");
        let listener = tokio::net::TcpListener::bind(address).await?;
        let server = axum::serve(listener, router(state));
        Ok(Server { server })
    }

    /// Runs the HTTP server.
    ///
    /// This only returns if there is a fatal error.
    pub async fn run(self) -> Result<()> {
        Ok(self.server.await?)
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/radio",
            get(radio::get_radio)
                .put(radio::put_radio)
                .with_state(state.clone()),
        )
        .route(
            "/configure",
            get(radio::get_configure)
                .post(radio::post_configure)
                .with_state(state),
        )
        .route("/send_udp_packet", get(test_packets::get_send_udp_packet))
        .route("/api/version", get(version::get_version))
        .layer(TraceLayer::new_for_http())
}

mod json_error {
    use anyhow::Error;
    use axum::{
        http::StatusCode,
        response::{IntoResponse, Response},
    };
    use serde::Serialize;

    #[derive(Serialize, Debug, Clone, Eq, PartialEq)]
    pub struct JsonError {
        http_status_code: u16,
        error_description: String,
    }

    impl JsonError {
        pub fn from_error(status_code: StatusCode, error: Error) -> JsonError {
            JsonError {
                http_status_code: status_code.as_u16(),
                error_description: format!("{error:#}"),
            }
        }

        pub fn server_error(error: Error) -> JsonError {
            JsonError::from_error(StatusCode::INTERNAL_SERVER_ERROR, error)
        }
    }

    impl IntoResponse for JsonError {
        fn into_response(self) -> Response {
            let status_code = StatusCode::from_u16(self.http_status_code)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            match serde_json::to_string(&self) {
                Ok(json) => (status_code, json).into_response(),
                Err(_) => status_code.into_response(),
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{app::Backend, lock::HardwareLock, registers, regs::MemoryBus};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
    };
    use tower::ServiceExt;

    fn state(bus: &MemoryBus) -> AppState {
        AppState::new(Backend::simulated(bus.clone(), HardwareLock::disabled()))
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn get_radio() {
        let bus = MemoryBus::new();
        let response = router(state(&bus))
            .oneshot(
                Request::get(
                    "/api/radio?adc_freq_hz=10000000&tune_freq_hz=5000000&streaming=streaming",
                )
                .body(Body::empty())
                .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report: radio_tuner_json::Report =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(report.adc_phase_increment.value, 10737418);
        assert_eq!(
            report.readback.unwrap().tuner_phase_increment.hex,
            "0xFFAE147B"
        );
        assert_eq!(
            bus.peek(registers::STREAM_GPIO_ADDRESS, registers::gpio::DATA),
            Some(1)
        );
    }

    #[tokio::test]
    async fn put_radio() {
        let bus = MemoryBus::new();
        let response = router(state(&bus))
            .oneshot(
                Request::put("/api/radio")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"adc_freq_hz": 1e6, "streaming": false}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report: radio_tuner_json::Report =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(report.adc_phase_increment.value, 1073741);
        assert_eq!(report.tune_freq_hz, 0.0);
        assert!(!report.streaming.is_enabled());
    }

    #[tokio::test]
    async fn configure_text_error() {
        let bus = MemoryBus::new();
        bus.fail_open(
            registers::RADIO_PERIPH_ADDRESS,
            "failed to open /dev/mem: Permission denied (os error 13)",
        );
        let response = router(state(&bus))
            .oneshot(
                Request::get("/configure?adc_freq_hz=oops")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_string(response).await;
        assert!(text.contains("Computed ADC phase_input = 0 (0x00000000)"));
        assert!(text.contains("ERROR: failed to open /dev/mem: Permission denied (os error 13)"));
        assert!(!text.contains("Register Readback"));
    }

    #[tokio::test]
    async fn post_configure_form() {
        let bus = MemoryBus::new();
        let response = router(state(&bus))
            .oneshot(
                Request::post("/configure?tune_freq_hz=1&adc_freq_hz=1")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("adc_freq_hz=10000000&streaming=streaming"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_string(response).await;
        assert!(text.contains("Computed ADC phase_input = 10737418 (0x00A3D70A)"));
        assert!(text.contains("Computed Tuner phase_input = -1 (0xFFFFFFFF)"));
        assert!(text.contains("Streaming is Enabled"));
        assert_eq!(
            bus.peek(registers::RADIO_PERIPH_ADDRESS, registers::radio::ADC_PINC),
            Some(10737418)
        );
    }

    #[tokio::test]
    async fn send_udp_packet() {
        let receiver = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = receiver.local_addr().unwrap().port();
        let response = router(state(&MemoryBus::new()))
            .oneshot(
                Request::get(format!("/send_udp_packet?ip=127.0.0.1&n=2&port={port}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let text = body_string(response).await;
        assert!(text.starts_with(&format!("Sending 2 packets to 127.0.0.1:{port}...\n")));
        assert!(text.ends_with("Finished sending packets.\n"));
        let mut buf = [0; 2048];
        for counter in 0..2u32 {
            let n = receiver.recv(&mut buf).await.unwrap();
            assert_eq!(n, crate::fifo::FRAME_BYTES);
            assert_eq!(&buf[..4], &counter.to_le_bytes());
        }
    }

    #[tokio::test]
    async fn send_udp_packet_invalid() {
        for (uri, message) in [
            (
                "/send_udp_packet?ip=127.0.0.1&n=0",
                "Invalid parameters. QUERY_STRING: ip=127.0.0.1&n=0",
            ),
            ("/send_udp_packet", "Invalid parameters. QUERY_STRING: "),
            ("/send_udp_packet?ip=300.1.1.1&n=1", "invalid IP address"),
        ] {
            let response = router(state(&MemoryBus::new()))
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
            assert!(body_string(response).await.starts_with(message), "{uri}");
        }
    }

    #[tokio::test]
    async fn version() {
        let response = router(state(&MemoryBus::new()))
            .oneshot(Request::get("/api/version").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let versions: radio_tuner_json::Versions =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(versions.radio_tuner_version, env!("CARGO_PKG_VERSION"));
    }
}
