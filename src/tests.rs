#[cfg(test)]
mod tests {

    mod config_tests {
        use crate::Config;
        use std::path::PathBuf;

        fn temp_config(name: &str, contents: &str) -> PathBuf {
            let path = std::env::temp_dir().join(format!(
                "videoplay_{}_{}.toml",
                name,
                std::process::id()
            ));
            std::fs::write(&path, contents).unwrap();
            path
        }

        #[test]
        fn test_defaults() {
            let config = Config::with_api_url("http://localhost:8000/api");
            assert!(config.validate().is_ok());
            assert_eq!(config.views.delay_ms, 2000);
            assert_eq!(config.site.views_label, "visualizações");
            assert!(!config.experimental.after);
            assert!(config.revalidate.secret.is_none());
            assert!(config.cache.video_max_age().is_none());

            let hosts: Vec<&str> = config
                .images
                .remote_patterns
                .iter()
                .map(|p| p.hostname.as_str())
                .collect();
            assert_eq!(hosts, vec!["localhost", "host.docker.internal"]);
        }

        #[test]
        fn test_base_url_is_required() {
            let config = Config::with_api_url("");
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_base_url_must_be_http() {
            assert!(Config::with_api_url("not a url").validate().is_err());
            assert!(Config::with_api_url("ftp://example.com").validate().is_err());
            assert!(Config::with_api_url("https://api.example.com").validate().is_ok());
        }

        #[test]
        fn test_empty_secret_is_rejected() {
            let mut config = Config::with_api_url("http://localhost:8000");
            config.revalidate.secret = Some(String::new());
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_device_sizes_must_be_positive() {
            let mut config = Config::with_api_url("http://localhost:8000");
            config.images.device_sizes = vec![0, 640];
            assert!(config.validate().is_err());
            config.images.device_sizes.clear();
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_image_limits_must_be_positive() {
            let mut config = Config::with_api_url("http://localhost:8000");
            assert_eq!(config.images.cache_max_entries, 256);
            assert_eq!(config.images.max_source_bytes, 20 * 1024 * 1024);
            config.images.cache_max_entries = 0;
            assert!(config.validate().is_err());

            let mut config = Config::with_api_url("http://localhost:8000");
            config.images.max_source_bytes = 0;
            assert!(config.validate().is_err());
        }

        #[test]
        fn test_load_from_file() {
            let path = temp_config(
                "load",
                r#"
[api]
base_url = "http://django:8000/api"

[views]
delay_ms = 0

[cache]
video_max_age_secs = 300

[experimental]
after = true

[[images.remote_patterns]]
hostname = "cdn.example.com"
"#,
            );

            let config = Config::load(&path, None).unwrap();
            assert_eq!(config.api.base_url, "http://django:8000/api");
            assert_eq!(config.views.delay_ms, 0);
            assert_eq!(config.cache.video_max_age_secs, Some(300));
            assert!(config.experimental.after);
            assert_eq!(config.images.remote_patterns.len(), 1);
            assert_eq!(config.server.port, 3000);

            std::fs::remove_file(path).ok();
        }

        #[test]
        fn test_env_override_wins() {
            let path = temp_config(
                "override",
                "[api]\nbase_url = \"http://from-file:8000\"\n",
            );
            let config = Config::load(&path, Some("http://from-env:8000/api")).unwrap();
            assert_eq!(config.api.base_url, "http://from-env:8000/api");
            std::fs::remove_file(path).ok();
        }

        #[test]
        fn test_missing_file_uses_defaults() {
            let path = std::env::temp_dir().join("videoplay_does_not_exist.toml");
            let config = Config::load(&path, Some("http://localhost:8000")).unwrap();
            assert_eq!(config.server.host, "127.0.0.1");
            assert!(Config::load(&path, None).is_err());
        }
    }

    mod model_tests {
        use crate::models::{VideoModel, ViewsResponse};

        #[test]
        fn test_video_keeps_unknown_fields() {
            let json = serde_json::json!({
                "id": 1,
                "slug": "abc",
                "title": "A video",
                "likes": 12,
                "num_views": 3
            });
            let video: VideoModel = serde_json::from_value(json).unwrap();
            assert_eq!(video.slug, "abc");
            assert_eq!(video.description, "");
            assert_eq!(video.views, None);
            assert!(video.tags.is_empty());
            assert_eq!(video.extra.get("likes"), Some(&serde_json::json!(12)));
        }

        #[test]
        fn test_video_with_zero_views() {
            let json = serde_json::json!({"id": 1, "slug": "abc", "title": "A", "views": 0});
            let video: VideoModel = serde_json::from_value(json).unwrap();
            assert_eq!(video.views, Some(0));
        }

        #[test]
        fn test_views_response_requires_views() {
            assert!(serde_json::from_str::<ViewsResponse>("{}").is_err());
            assert!(serde_json::from_str::<ViewsResponse>(r#"{"views": -1}"#).is_err());
            assert_eq!(
                serde_json::from_str::<ViewsResponse>(r#"{"views": 7}"#).unwrap().views,
                7
            );
        }
    }

    mod views_tests {
        use crate::services::api::ContentApi;
        use crate::services::cache::FetchCache;
        use crate::services::views::{views_text, ViewCounter};
        use crate::Config;
        use std::sync::Arc;

        // Nothing listens on the discard port; any request would fail.
        fn offline_api() -> ContentApi {
            let config = Config::with_api_url("http://127.0.0.1:9");
            ContentApi::new(&config, Arc::new(FetchCache::new())).unwrap()
        }

        #[test]
        fn test_views_text() {
            assert_eq!(views_text(7, "visualizações"), "7 visualizações");
            assert_eq!(views_text(1, "views"), "1 views");
        }

        #[tokio::test]
        async fn test_known_count_skips_fetch() {
            let api = offline_api();
            let counter = ViewCounter::new(42, Some(5));
            assert_eq!(
                counter.render(&api, "visualizações").await.unwrap(),
                "5 visualizações"
            );
        }

        #[tokio::test]
        async fn test_zero_is_a_known_count() {
            let api = offline_api();
            let counter = ViewCounter::new(42, Some(0));
            assert_eq!(
                counter.render(&api, "visualizações").await.unwrap(),
                "0 visualizações"
            );
        }
    }
}
