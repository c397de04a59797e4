#[cfg(test)]
mod integration_tests {
    use crate::backend::{BackendResponse, RenderBackend};
    use crate::render::RenderRequest;
    use crate::{build_router, AppState, Config, GatewayError, HttpBackend};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use axum::Router;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tower::ServiceExt;

    const PNG_BYTES: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    /// Backend double that records every render request and replies with a canned response.
    struct RecordingBackend {
        calls: Mutex<Vec<RenderRequest>>,
        reply: Result<BackendResponse, GatewayError>,
    }

    impl RecordingBackend {
        fn ok() -> Arc<Self> {
            Self::replying(Ok(BackendResponse {
                status: 200,
                content_type: Some("image/png".to_string()),
                body: PNG_BYTES.to_vec(),
            }))
        }

        fn replying(reply: Result<BackendResponse, GatewayError>) -> Arc<Self> {
            Arc::new(Self {
                calls: Mutex::new(Vec::new()),
                reply,
            })
        }

        fn calls(&self) -> Vec<RenderRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RenderBackend for RecordingBackend {
        async fn post(
            &self,
            _url: &str,
            body: &RenderRequest,
            _timeout: Duration,
        ) -> Result<BackendResponse, GatewayError> {
            self.calls.lock().unwrap().push(body.clone());
            self.reply.clone()
        }
    }

    struct PanickingBackend;

    #[async_trait]
    impl RenderBackend for PanickingBackend {
        async fn post(
            &self,
            _url: &str,
            _body: &RenderRequest,
            _timeout: Duration,
        ) -> Result<BackendResponse, GatewayError> {
            panic!("renderer exploded")
        }
    }

    struct Gateway {
        state: Arc<AppState>,
        router: Router,
    }

    impl Gateway {
        fn new(config: Config, backend: Arc<dyn RenderBackend>) -> Self {
            let state = Arc::new(AppState::new(config, backend));
            let router = build_router(state.clone());
            Self { state, router }
        }

        async fn get(&self, uri: &str) -> Response {
            self.send(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        async fn send(&self, mut request: Request<Body>) -> Response {
            let peer: SocketAddr = "10.1.2.3:55000".parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(peer));
            self.router.clone().oneshot(request).await.unwrap()
        }
    }

    fn secured() -> Config {
        Config {
            tokens: vec!["secret".to_string(), "other".to_string()],
            ..Default::default()
        }
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_root_describes_service() {
        let gateway = Gateway::new(Config::default(), RecordingBackend::ok());
        let response = gateway.get("/").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["auth_required"], false);
        assert_eq!(json["default_resolution"], "1280x800");
        assert_eq!(json["wait_until"], "networkidle0");
        assert!(json["devices_hint"].as_str().unwrap().contains("/devices"));

        let gateway = Gateway::new(secured(), RecordingBackend::ok());
        let json = body_json(gateway.get("/").await).await;
        assert_eq!(json["auth_required"], true);
    }

    #[tokio::test]
    async fn test_devices_endpoint() {
        let gateway = Gateway::new(Config::default(), RecordingBackend::ok());
        let response = gateway.get("/devices").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["desktop-hd"]["width"], 1920);
        assert_eq!(json["desktop-hd"]["height"], 1080);
        assert!(json["iphone13"]["userAgent"].is_string());
        assert_eq!(json["iphone13"]["isMobile"], true);
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let gateway = Gateway::new(Config::default(), RecordingBackend::ok());
        let json = body_json(gateway.get("/health").await).await;
        assert_eq!(json["status"], "healthy");
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_metrics_disabled_by_default() {
        let gateway = Gateway::new(Config::default(), RecordingBackend::ok());
        assert_eq!(gateway.get("/metrics").await.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_rendered_when_enabled() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || crate::metrics::record_request("ok"));

        let state = AppState::new(Config::default(), RecordingBackend::ok()).with_prometheus(handle);
        let router = build_router(Arc::new(state));
        let response = router
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with("text/plain"));
        let body = String::from_utf8(body_bytes(response).await).unwrap();
        assert!(body.contains("screencurl_requests_total{outcome=\"ok\"} 1"));
    }

    #[tokio::test]
    async fn test_successful_screenshot() {
        let backend = RecordingBackend::ok();
        let gateway = Gateway::new(Config::default(), backend.clone());

        let response = gateway.get("/screenshot?url=http://x.com").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=10");
        assert_eq!(body_bytes(response).await, PNG_BYTES);

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "http://x.com");
        assert_eq!(calls[0].viewport.width, 1280);
        assert_eq!(calls[0].viewport.height, 800);
    }

    #[tokio::test]
    async fn test_missing_url_is_bad_request() {
        let backend = RecordingBackend::ok();
        let gateway = Gateway::new(Config::default(), backend.clone());

        let response = gateway.get("/screenshot").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["detail"].as_str().unwrap().contains("url"));

        assert_eq!(gateway.get("/screenshot?url=").await.status(), StatusCode::BAD_REQUEST);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_scenario() {
        let backend = RecordingBackend::ok();
        let gateway = Gateway::new(Config::default(), backend.clone());

        assert_eq!(gateway.get("/screenshot?url=http://x.com").await.status(), StatusCode::OK);

        tokio::time::advance(Duration::from_secs(5)).await;
        let response = gateway.get("/screenshot?url=http://x.com").await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "5");
        let json = body_json(response).await;
        assert!(json["detail"].as_str().unwrap().contains("Rate limit exceeded"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(gateway.get("/screenshot?url=http://x.com").await.status(), StatusCode::OK);

        assert_eq!(backend.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_rate_limit_keyed_on_raw_url() {
        let gateway = Gateway::new(Config::default(), RecordingBackend::ok());

        assert_eq!(gateway.get("/screenshot?url=http://a.com").await.status(), StatusCode::OK);
        assert_eq!(gateway.get("/screenshot?url=http://a.com/").await.status(), StatusCode::OK);
        assert_eq!(
            gateway.get("/screenshot?url=http://a.com&width=640").await.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }

    #[tokio::test]
    async fn test_device_preset_viewport_sent_to_backend() {
        let backend = RecordingBackend::ok();
        let gateway = Gateway::new(Config::default(), backend.clone());

        let response = gateway.get("/screenshot?url=http://x.com&device=desktop-hd").await;
        assert_eq!(response.status(), StatusCode::OK);

        let calls = backend.calls();
        assert_eq!(calls[0].viewport.width, 1920);
        assert_eq!(calls[0].viewport.height, 1080);
    }

    #[tokio::test]
    async fn test_explicit_width_overrides_device_in_any_order() {
        let backend = RecordingBackend::ok();
        let gateway = Gateway::new(Config::default(), backend.clone());

        gateway.get("/screenshot?url=http://x.com&device=desktop-hd&width=800").await;
        gateway.get("/screenshot?width=800&device=DESKTOP-HD&url=http://y.com").await;

        let calls = backend.calls();
        assert_eq!(calls.len(), 2);
        for call in calls {
            assert_eq!(call.viewport.width, 800);
            assert_eq!(call.viewport.height, 1080);
        }
    }

    #[tokio::test]
    async fn test_mobile_device_sends_user_agent() {
        let backend = RecordingBackend::ok();
        let gateway = Gateway::new(Config::default(), backend.clone());

        gateway.get("/screenshot?url=http://x.com&device=iphone13").await;

        let calls = backend.calls();
        assert!(calls[0].viewport.is_mobile);
        assert!(calls[0].viewport.has_touch);
        assert!(calls[0].user_agent.as_deref().unwrap().contains("iPhone"));
    }

    #[tokio::test]
    async fn test_unknown_device_never_calls_backend() {
        let backend = RecordingBackend::ok();
        let gateway = Gateway::new(Config::default(), backend.clone());

        let response = gateway.get("/screenshot?url=http://x.com&device=toaster").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        let detail = json["detail"].as_str().unwrap();
        assert!(detail.contains("toaster"));
        assert!(detail.contains("desktop-hd"));

        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_dimension_does_not_consume_cooldown() {
        let backend = RecordingBackend::ok();
        let gateway = Gateway::new(Config::default(), backend.clone());

        let response = gateway.get("/screenshot?url=http://x.com&width=wide").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(gateway.get("/screenshot?url=http://x.com&height=0").await.status(), StatusCode::BAD_REQUEST);

        assert_eq!(gateway.get("/screenshot?url=http://x.com").await.status(), StatusCode::OK);
        assert_eq!(backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_open_gateway_accepts_any_request() {
        let gateway = Gateway::new(Config::default(), RecordingBackend::ok());
        assert_eq!(gateway.get("/screenshot?url=http://x.com").await.status(), StatusCode::OK);
        assert_eq!(
            gateway.get("/screenshot?url=http://y.com&token=whatever").await.status(),
            StatusCode::OK
        );
    }

    #[tokio::test]
    async fn test_missing_token_rejected_without_side_effects() {
        let backend = RecordingBackend::ok();
        let gateway = Gateway::new(secured(), backend.clone());

        let response = gateway.get("/screenshot?url=http://x.com").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert!(json["detail"].is_string());

        let response = gateway.get("/screenshot?url=http://x.com&token=wrong").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        assert_eq!(gateway.state.access.get("10.1.2.3"), 0);
        assert_eq!(gateway.state.limiter.tracked_keys(), 0);
        assert!(backend.calls().is_empty());

        // The cooldown for the URL is still available to an authorized caller.
        let response = gateway.get("/screenshot?url=http://x.com&token=secret").await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_token_carriers() {
        let gateway = Gateway::new(secured(), RecordingBackend::ok());

        let response = gateway.get("/screenshot?url=http://q.com&token=secret").await;
        assert_eq!(response.status(), StatusCode::OK);

        let request = Request::get("/screenshot?url=http://h.com")
            .header("X-API-Token", "other")
            .body(Body::empty())
            .unwrap();
        assert_eq!(gateway.send(request).await.status(), StatusCode::OK);

        let request = Request::get("/screenshot?url=http://c.com")
            .header(header::COOKIE, "session=abc; token=secret")
            .body(Body::empty())
            .unwrap();
        assert_eq!(gateway.send(request).await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_access_count_includes_rate_limited_attempts() {
        let gateway = Gateway::new(Config::default(), RecordingBackend::ok());

        gateway.get("/screenshot?url=http://x.com").await;
        gateway.get("/screenshot?url=http://x.com").await;
        gateway.get("/screenshot?url=http://x.com").await;
        gateway.get("/screenshot").await;

        assert_eq!(gateway.state.access.get("10.1.2.3"), 4);
    }

    #[tokio::test]
    async fn test_repeated_parameters_still_require_auth() {
        let backend = RecordingBackend::ok();
        let gateway = Gateway::new(secured(), backend.clone());

        let response = gateway.get("/screenshot?url=http://a.com&url=http://b.com").await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(gateway.state.access.get("10.1.2.3"), 0);
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_parameters_are_counted_and_first_wins() {
        let backend = RecordingBackend::ok();
        let gateway = Gateway::new(Config::default(), backend.clone());

        let response = gateway
            .get("/screenshot?url=http://a.com&url=http://b.com&device=desktop-hd&device=nope")
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(gateway.state.access.get("10.1.2.3"), 1);

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "http://a.com");
        assert_eq!(calls[0].viewport.width, 1920);
    }

    #[tokio::test]
    async fn test_client_without_peer_address_is_unknown() {
        let gateway = Gateway::new(Config::default(), RecordingBackend::ok());
        let request = Request::get("/screenshot?url=http://x.com").body(Body::empty()).unwrap();
        gateway.router.clone().oneshot(request).await.unwrap();

        assert_eq!(gateway.state.access.get(crate::UNKNOWN_CLIENT), 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_is_500_with_body() {
        let backend = RecordingBackend::replying(Ok(BackendResponse {
            status: 503,
            content_type: Some("text/plain".to_string()),
            body: b"render failed".to_vec(),
        }));
        let gateway = Gateway::new(Config::default(), backend);

        let response = gateway.get("/screenshot?url=http://x.com").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert!(json["detail"].as_str().unwrap().contains("render failed"));
    }

    #[tokio::test]
    async fn test_upstream_detail_truncated() {
        let backend = RecordingBackend::replying(Ok(BackendResponse {
            status: 500,
            content_type: None,
            body: "e".repeat(1_000).into_bytes(),
        }));
        let gateway = Gateway::new(Config::default(), backend);

        let json = body_json(gateway.get("/screenshot?url=http://x.com").await).await;
        let detail = json["detail"].as_str().unwrap();
        assert!(detail.contains(&"e".repeat(200)));
        assert!(!detail.contains(&"e".repeat(201)));
    }

    #[tokio::test]
    async fn test_transport_failure_is_tagged() {
        let backend =
            RecordingBackend::replying(Err(GatewayError::Transport("connection refused".to_string())));
        let gateway = Gateway::new(Config::default(), backend);

        let response = gateway.get("/screenshot?url=http://x.com").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert!(json["detail"].as_str().unwrap().contains("request error"));
    }

    #[tokio::test]
    async fn test_panic_becomes_json_500() {
        let gateway = Gateway::new(Config::default(), Arc::new(PanickingBackend));

        let response = gateway.get("/screenshot?url=http://x.com").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert!(json["detail"].as_str().unwrap().contains("renderer exploded"));

        // The gateway keeps serving afterwards.
        assert_eq!(gateway.get("/health").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_concurrent_requests_admit_once() {
        let backend = RecordingBackend::ok();
        let gateway = Arc::new(Gateway::new(Config::default(), backend.clone()));

        let responses = futures::future::join_all((0..10).map(|_| {
            let gateway = gateway.clone();
            async move { gateway.get("/screenshot?url=http://race.com").await.status() }
        }))
        .await;

        let ok = responses.iter().filter(|s| **s == StatusCode::OK).count();
        let limited = responses
            .iter()
            .filter(|s| **s == StatusCode::TOO_MANY_REQUESTS)
            .count();
        assert_eq!(ok, 1);
        assert_eq!(limited, 9);
        assert_eq!(backend.calls().len(), 1);
    }

    /// Spawns a fake rendering service on an ephemeral port.
    async fn spawn_fake_backend(status: StatusCode, body: &'static [u8]) -> SocketAddr {
        use axum::routing::post;
        use axum::Json;

        let app = Router::new().route(
            "/screenshot",
            post(move |Json(request): Json<serde_json::Value>| async move {
                assert!(request["url"].is_string());
                assert_eq!(request["options"]["type"], "png");
                (status, [(header::CONTENT_TYPE, "image/png")], body)
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn test_http_backend_round_trip() {
        let addr = spawn_fake_backend(StatusCode::OK, PNG_BYTES).await;
        let config = Config {
            browserless_url: format!("http://{addr}"),
            ..Default::default()
        };
        let backend = Arc::new(crate::build_http_backend(&config).unwrap());
        let gateway = Gateway::new(config, backend);

        let response = gateway.get("/screenshot?url=http://x.com&device=ipad").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_bytes(response).await, PNG_BYTES);
    }

    #[tokio::test]
    async fn test_http_backend_reports_status() {
        let addr = spawn_fake_backend(StatusCode::SERVICE_UNAVAILABLE, b"render failed").await;
        let config = Config {
            browserless_url: format!("http://{addr}"),
            ..Default::default()
        };
        let backend = HttpBackend::default();
        let request = crate::RenderRequestBuilder::new(&config, Arc::new(crate::DeviceCatalog::builtin()))
            .build(&crate::RenderParams {
                url: "http://x.com",
                ..Default::default()
            })
            .unwrap();

        let response = backend
            .post(&config.render_url(), &request, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(response.body, b"render failed");
    }

    #[tokio::test]
    async fn test_http_backend_connection_refused() {
        // Bind then drop to get a port nothing listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = Config {
            browserless_url: format!("http://{addr}"),
            ..Default::default()
        };
        let backend = Arc::new(crate::build_http_backend(&config).unwrap());
        let gateway = Gateway::new(config, backend);

        let response = gateway.get("/screenshot?url=http://x.com").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert!(json["detail"].as_str().unwrap().contains("request error"));
    }
}
