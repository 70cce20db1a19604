//! Integration tests for the motion-agent HTTP server

#[cfg(feature = "server")]
mod server_tests {
    use athlete_motion_agent::config::Config;
    use athlete_motion_agent::server::{run, ServerConfig};
    use std::path::PathBuf;
    use std::time::Duration;

    fn test_config() -> (Config, PathBuf) {
        let dir = std::env::temp_dir().join(format!("motion-server-test-{}", uuid::Uuid::new_v4()));
        let config = Config {
            port: 0,
            data_path: dir.join("data"),
            classifier_path: dir.join("classifiers"),
            ..Config::default()
        };
        (config, dir)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (config, dir) = test_config();
        let (addr, shutdown_tx, _server) = run(ServerConfig::new(config))
            .await
            .expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");

        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        assert!(body["version"].as_str().is_some());
        assert_eq!(body["active_sessions"], 0);
        assert_eq!(body["event_detector"], "stub");
        assert_eq!(body["type_classifier"], "stub");

        let _ = shutdown_tx.send(());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_classifier_upload_replaces_model() {
        let (config, dir) = test_config();
        let model_dir = config.event_detection_models();
        let (addr, shutdown_tx, _server) = run(ServerConfig::new(config))
            .await
            .expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let artifact = serde_json::json!({
            "kind": "logistic",
            "weights": [0.5, -0.25],
            "bias": 0.1
        });
        let response = client
            .post(format!("http://{}/bool-classifier", addr))
            .json(&artifact)
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());

        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["status"], "ok");
        let model = body["model"].as_str().expect("model name").to_string();

        let health: serde_json::Value = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(health["event_detector"], model.as_str());
        assert_eq!(std::fs::read_dir(&model_dir).unwrap().count(), 1);

        let _ = shutdown_tx.send(());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_invalid_classifier_rejected() {
        let (config, dir) = test_config();
        let model_dir = config.type_classification_models();
        let (addr, shutdown_tx, _server) = run(ServerConfig::new(config))
            .await
            .expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();

        // A detector artifact is not a type classifier.
        let response = client
            .post(format!("http://{}/type-classifier", addr))
            .json(&serde_json::json!({"kind": "logistic", "weights": [1.0], "bias": 0.0}))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let body: serde_json::Value = response.json().await.expect("Failed to parse JSON");
        assert_eq!(body["code"], "INVALID_MODEL");

        let response = client
            .post(format!("http://{}/type-classifier", addr))
            .body("not json")
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);

        // Rejected uploads leave nothing behind.
        assert_eq!(std::fs::read_dir(&model_dir).unwrap().count(), 0);

        let _ = shutdown_tx.send(());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_shutdown_completes_and_saves_stats() {
        let (config, dir) = test_config();
        let stats_path = config.stats_path();
        let (addr, shutdown_tx, server) = run(ServerConfig::new(config))
            .await
            .expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .expect("Failed to send request");
        assert!(response.status().is_success());
        drop(client);

        shutdown_tx.send(()).expect("server still running");
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("Server did not stop")
            .expect("Server task panicked");
        assert!(stats_path.exists());

        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn test_stats_and_index() {
        let (config, dir) = test_config();
        let (addr, shutdown_tx, _server) = run(ServerConfig::new(config))
            .await
            .expect("Failed to start server");

        tokio::time::sleep(Duration::from_millis(100)).await;

        let client = reqwest::Client::new();
        let index = client
            .get(format!("http://{}/", addr))
            .send()
            .await
            .expect("Failed to send request")
            .text()
            .await
            .expect("Failed to read body");
        assert!(index.contains("/ws"));

        let stats: serde_json::Value = client
            .get(format!("http://{}/stats", addr))
            .send()
            .await
            .expect("Failed to send request")
            .json()
            .await
            .expect("Failed to parse JSON");
        assert_eq!(stats["readings_accepted"], 0);
        assert_eq!(stats["events_lost"], 0);

        let _ = shutdown_tx.send(());
        let _ = std::fs::remove_dir_all(dir);
    }
}
