//! Defines routes for the session-scoped compression service.
//!
//! ## Structure
//! - **Probes**
//!   - `GET  /healthz`, `GET /readyz`
//!
//! - **Session endpoints** (token from `?sessionId=` or the `sessionId` cookie)
//!   - `GET  /session` — resolve or issue a session
//!   - `POST /upload` — multipart image batch, compressed on arrival
//!   - `GET  /images` — original/compressed summaries
//!   - `GET  /download` — zip of all compressed files
//!   - `GET  /files/{kind}/{filename}` — one original or compressed file
//!
//! - **Housekeeping**
//!   - `GET  /cron/cleanup` — delete files past the retention window

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        session_handlers::{
            download_archive, get_artifact, get_session, list_images, run_cleanup, upload_images,
        },
    },
    services::session_service::SessionStore,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build the router for every endpoint.
///
/// `max_upload_bytes` caps the multipart request body of `/upload`.
pub fn routes(max_upload_bytes: usize) -> Router<SessionStore> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // session endpoints
        .route("/session", get(get_session))
        .route(
            "/upload",
            post(upload_images).layer(DefaultBodyLimit::max(max_upload_bytes)),
        )
        .route("/images", get(list_images))
        .route("/download", get(download_archive))
        .route("/files/{kind}/{filename}", get(get_artifact))
        // housekeeping
        .route("/cron/cleanup", get(run_cleanup))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::compression_service::testing::FakeCompressor;
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use std::{io::Read, path::Path, sync::Arc, time::Duration};
    use tower::ServiceExt;

    const BOUNDARY: &str = "squeeze-test-boundary";

    fn app(root: &Path) -> Router {
        let store = SessionStore::new(
            root,
            Duration::from_secs(3600),
            Arc::new(FakeCompressor::Halve),
        );
        routes(1024 * 1024).with_state(store)
    }

    fn multipart_body(files: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, bytes) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"images\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(uri: &str, files: &[(&str, &str)]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(files)))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn upload_list_and_download_flow() {
        let root = tempfile::tempdir().unwrap();
        let app = app(root.path());

        let response = app
            .clone()
            .oneshot(upload_request(
                "/upload?sessionId=flow",
                &[("a.png", "0123456789"), ("b.jpg", "abcdefghijklmnop")],
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
        let json = json_body(response).await;
        assert_eq!(json["sessionId"], "flow");
        assert_eq!(json["zipUrl"], "/download?sessionId=flow");
        assert_eq!(json["images"].as_array().unwrap().len(), 2);
        assert_eq!(json["failed"].as_array().unwrap().len(), 0);
        assert_eq!(json["images"][0]["originalName"], "a.png");
        assert_eq!(json["images"][0]["originalSize"], 10);
        assert_eq!(json["images"][0]["compressedSize"], 5);
        assert_eq!(json["images"][0]["savingsPercent"], 50.0);
        assert!(json["images"][0].get("originalBase64").is_none());

        let response = app.clone().oneshot(get("/images?sessionId=flow")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let listing = json_body(response).await;
        assert_eq!(listing["images"].as_array().unwrap().len(), 2);

        let compressed_url = listing["images"][0]["compressedUrl"].as_str().unwrap().to_string();
        let response = app.clone().oneshot(get(&compressed_url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get("/download?sessionId=flow")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/zip"
        );
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"flow-compressed.zip\""
        );
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let mut zip = zip::ZipArchive::new(std::io::Cursor::new(bytes.to_vec())).unwrap();
        assert_eq!(zip.len(), 2);
        let mut sizes = Vec::new();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).unwrap();
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf).unwrap();
            sizes.push(buf.len());
        }
        sizes.sort();
        assert_eq!(sizes, vec![5, 8]);
    }

    #[tokio::test]
    async fn upload_without_session_issues_cookie() {
        let root = tempfile::tempdir().unwrap();
        let response = app(root.path())
            .oneshot(upload_request("/upload?embed=true", &[("a.gif", "GIF89a..")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .to_string();
        let json = json_body(response).await;
        let session = json["sessionId"].as_str().unwrap();
        assert!(cookie.starts_with(&format!("sessionId={};", session)));
        assert!(
            json["images"][0]["compressedBase64"]
                .as_str()
                .unwrap()
                .starts_with("data:image/gif;base64,")
        );
    }

    #[tokio::test]
    async fn cookie_session_reaches_listing() {
        let root = tempfile::tempdir().unwrap();
        let app = app(root.path());
        app.clone()
            .oneshot(upload_request("/upload?sessionId=jar", &[("a.svg", "<svg/>")]))
            .await
            .unwrap();

        let request = Request::builder()
            .uri("/images")
            .header(header::COOKIE, "sessionId=jar")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["images"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn padded_session_reaches_the_same_data() {
        let root = tempfile::tempdir().unwrap();
        let app = app(root.path());
        let response = app
            .clone()
            .oneshot(upload_request("/upload?sessionId=%20abc", &[("a.png", "0123")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["sessionId"], "abc");

        let response = app.oneshot(get("/images?sessionId=%20abc")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["images"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn empty_upload_is_bad_request() {
        let root = tempfile::tempdir().unwrap();
        let response = app(root.path())
            .oneshot(upload_request("/upload?sessionId=s1", &[]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["status"], 400);
    }

    #[tokio::test]
    async fn missing_or_unknown_session_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let app = app(root.path());

        for (uri, expected) in [
            ("/images", StatusCode::BAD_REQUEST),
            ("/download", StatusCode::BAD_REQUEST),
            ("/images?sessionId=ghost", StatusCode::NOT_FOUND),
            ("/download?sessionId=ghost", StatusCode::NOT_FOUND),
            ("/images?sessionId=..%2Fetc", StatusCode::BAD_REQUEST),
            ("/files/original/x.png?sessionId=ghost", StatusCode::NOT_FOUND),
            ("/files/thumbnail/x.png?sessionId=ghost", StatusCode::NOT_FOUND),
        ] {
            let response = app.clone().oneshot(get(uri)).await.unwrap();
            assert_eq!(response.status(), expected, "{}", uri);
        }
    }

    #[tokio::test]
    async fn session_endpoint_echoes_or_issues() {
        let root = tempfile::tempdir().unwrap();
        let app = app(root.path());

        let response = app.clone().oneshot(get("/session")).await.unwrap();
        assert!(response.headers().get(header::SET_COOKIE).is_some());
        assert_eq!(json_body(response).await["issued"], true);

        let response = app.oneshot(get("/session?sessionId=keep")).await.unwrap();
        let json = json_body(response).await;
        assert_eq!(json["sessionId"], "keep");
        assert_eq!(json["issued"], false);
    }

    #[tokio::test]
    async fn cleanup_and_probes_respond() {
        let root = tempfile::tempdir().unwrap();
        let app = app(root.path());

        let response = app.clone().oneshot(get("/cron/cleanup")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["message"], "Old files cleaned up");
        assert_eq!(json["deletedFilesCount"], 0);

        let response = app.clone().oneshot(get("/healthz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let response = app.oneshot(get("/readyz")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
