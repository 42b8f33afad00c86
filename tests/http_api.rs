use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tokio::net::TcpListener;

use archive_api::archive::BuildOptions;
use archive_api::mail::{Attachment, MailRelay};
use archive_api::server::{AppState, router};

const PNG: &str = "image/png";
const JPEG: &str = "image/jpeg";
const XML: &str = "application/xml";
const PDF: &str = "application/pdf";

#[derive(Default)]
struct RecordingRelay {
    sent: Mutex<Vec<(String, String, String, usize)>>,
}

#[async_trait]
impl MailRelay for RecordingRelay {
    async fn send(&self, recipient: &str, attachment: &Attachment) -> Result<()> {
        self.sent.lock().unwrap().push((
            recipient.to_string(),
            attachment.filename.clone(),
            attachment.content_type.clone(),
            attachment.content.len(),
        ));
        Ok(())
    }
}

async fn spawn_app(mail: Option<Arc<dyn MailRelay>>) -> String {
    let state = AppState::new(BuildOptions::default(), mail);
    let app = router(state, 1 << 20, 1 << 16);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn file_part(name: &str, mime: &str, data: Vec<u8>) -> Part {
    Part::bytes(data).file_name(name.to_string()).mime_str(mime).unwrap()
}

#[tokio::test]
async fn built_archive_inspects_back_to_its_inputs() {
    let base = spawn_app(None).await;
    let client = reqwest::Client::new();

    let form = Form::new()
        .part("files[]", file_part("ten.png", PNG, vec![1; 10]))
        .part("files[]", file_part("photos/twenty.jpg", JPEG, vec![2; 20]))
        .part("files[]", file_part("thirty.xml", XML, vec![3; 30]));
    let resp = client
        .post(format!("{base}/api/archive/files"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "application/zip");
    assert_eq!(
        resp.headers()["content-disposition"],
        "attachment; filename=archive.zip"
    );
    let zip = resp.bytes().await.unwrap().to_vec();
    let zip_len = zip.len();

    let form = Form::new().part("file", file_part("archive.zip", "application/zip", zip));
    let resp = client
        .post(format!("{base}/api/archive/information"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let summary: Value = resp.json().await.unwrap();
    assert_eq!(summary["filename"], "archive.zip");
    assert_eq!(summary["archive_size"], zip_len as u64);
    assert_eq!(summary["total_size"], 60);
    assert_eq!(summary["total_files"], 3);

    let files = summary["files"].as_array().unwrap();
    let paths: Vec<_> = files.iter().map(|f| f["file_path"].as_str().unwrap()).collect();
    assert_eq!(paths, ["ten.png", "photos/twenty.jpg", "thirty.xml"]);
    let sizes: Vec<_> = files.iter().map(|f| f["size"].as_u64().unwrap()).collect();
    assert_eq!(sizes, [10, 20, 30]);
    assert!(files.iter().all(|f| f["mimetype"] == "application/octet-stream"));
}

#[tokio::test]
async fn build_without_files_is_rejected() {
    let base = spawn_app(None).await;
    let form = Form::new().text("note", "nothing attached");
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/archive/files"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.text().await.unwrap(), "No files uploaded");
}

#[tokio::test]
async fn build_with_disallowed_type_is_rejected() {
    let base = spawn_app(None).await;
    let form = Form::new()
        .part("files[]", file_part("ok.png", PNG, vec![0; 4]))
        .part("files[]", file_part("a.txt", "text/plain", b"hello".to_vec()));
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/archive/files"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.text().await.unwrap(), "File type not allowed: a.txt");
}

#[tokio::test]
async fn inspect_rejects_non_zip_upload() {
    let base = spawn_app(None).await;
    let form = Form::new().part(
        "file",
        file_part("x", "application/zip", b"this is not a zip file at all".to_vec()),
    );
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/archive/information"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.text().await.unwrap(), "Not a valid ZIP file");
}

#[tokio::test]
async fn inspect_without_file_is_rejected() {
    let base = spawn_app(None).await;
    let form = Form::new().text("other", "value");
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/archive/information"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.text().await.unwrap(), "No file uploaded");
}

#[tokio::test]
async fn only_post_is_routed() {
    let base = spawn_app(None).await;
    let client = reqwest::Client::new();
    for path in ["/api/archive/files", "/api/archive/information", "/api/mail/file"] {
        let resp = client.get(format!("{base}{path}")).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED, "{path}");
    }
}

#[tokio::test]
async fn mail_relays_to_every_recipient() {
    let relay = Arc::new(RecordingRelay::default());
    let base = spawn_app(Some(relay.clone() as Arc<dyn MailRelay>)).await;

    let form = Form::new()
        .part("file", file_part("report.pdf", PDF, vec![b'%'; 64]))
        .text("emails", "a@example.com, b@example.com,");
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/mail/file"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let sent = relay.sent.lock().unwrap().clone();
    assert_eq!(
        sent,
        [
            ("a@example.com".to_string(), "report.pdf".to_string(), PDF.to_string(), 64),
            ("b@example.com".to_string(), "report.pdf".to_string(), PDF.to_string(), 64),
        ]
    );
}

#[tokio::test]
async fn mail_uses_its_own_policy() {
    let relay = Arc::new(RecordingRelay::default());
    let base = spawn_app(Some(relay.clone() as Arc<dyn MailRelay>)).await;

    // XML is accepted for archives but not by the mail relay
    let form = Form::new()
        .part("file", file_part("data.xml", XML, b"<x/>".to_vec()))
        .text("emails", "a@example.com");
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/mail/file"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.text().await.unwrap(), "Unsupported file type");
    assert!(relay.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn mail_requires_recipients() {
    let relay = Arc::new(RecordingRelay::default());
    let base = spawn_app(Some(relay.clone() as Arc<dyn MailRelay>)).await;

    let form = Form::new()
        .part("file", file_part("photo.png", PNG, vec![7; 8]))
        .text("emails", " , ");
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/mail/file"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.text().await.unwrap(), "No emails provided");
}

#[tokio::test]
async fn mail_without_relay_is_unavailable() {
    let base = spawn_app(None).await;

    let form = Form::new()
        .part("file", file_part("photo.png", PNG, vec![7; 8]))
        .text("emails", "a@example.com");
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/mail/file"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn build_upload_over_limit_is_rejected() {
    let base = spawn_app(None).await;
    let form = Form::new().part("files[]", file_part("big.png", PNG, vec![0; 2 << 20]));
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/archive/files"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(resp.text().await.unwrap(), "Error parsing form");
}

#[tokio::test]
async fn mail_upload_over_limit_is_rejected() {
    let relay = Arc::new(RecordingRelay::default());
    let base = spawn_app(Some(relay.clone() as Arc<dyn MailRelay>)).await;

    // Over the mail route's own cap while well under the archive routes'
    let form = Form::new()
        .part("file", file_part("photo.png", PNG, vec![0; 128 << 10]))
        .text("emails", "a@example.com");
    let resp = reqwest::Client::new()
        .post(format!("{base}/api/mail/file"))
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(resp.text().await.unwrap(), "Error parsing form");
    assert!(relay.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn text_parts_are_not_uploads() {
    let base = spawn_app(None).await;
    let client = reqwest::Client::new();

    let form = Form::new().text("files[]", "just text");
    let resp = client
        .post(format!("{base}/api/archive/files"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.text().await.unwrap(), "No files uploaded");

    let form = Form::new().text("file", "just text");
    let resp = client
        .post(format!("{base}/api/archive/information"))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(resp.text().await.unwrap(), "No file uploaded");
}
