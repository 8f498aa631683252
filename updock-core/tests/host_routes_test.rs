//! Host HTTP surface against a live server

mod common;

use common::{snapshot, TestHost};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use updock_core::archive;
use updock_core::protocol::{ErrorResponse, HealthResponse, VersionsResponse};

#[tokio::test]
async fn test_versions_lists_grammar_matches_newest_first() {
    let host = TestHost::start().await;

    let response = reqwest::get(host.url("/versions")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: VersionsResponse = response.json().await.unwrap();
    assert_eq!(body.versions, vec!["2.1.0", "1.0.0"]);
    assert_eq!(body.latest.as_deref(), Some("2.1.0"));
}

#[tokio::test]
async fn test_versions_empty_catalog() {
    let host = TestHost::start_with(TempDir::new().unwrap()).await;

    let body: VersionsResponse = reqwest::get(host.url("/versions"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body.versions.is_empty());
    assert_eq!(body.latest, None);
}

#[tokio::test]
async fn test_health() {
    let host = TestHost::start().await;

    let response = reqwest::get(host.url("/health")).await.unwrap();
    assert_eq!(response.status(), 200);

    let body: HealthResponse = response.json().await.unwrap();
    assert_eq!(body.status, "OK");
    assert_eq!(body.versions, vec!["2.1.0", "1.0.0"]);
    chrono::DateTime::parse_from_rfc3339(&body.timestamp).unwrap();
}

#[tokio::test]
async fn test_catalog_read_failure_is_500_without_paths() {
    let packages = TempDir::new().unwrap();
    let host = TestHost::start_with(packages).await;
    let root = host.packages.path().to_path_buf();
    std::fs::remove_dir_all(&root).unwrap();

    for path in ["/versions", "/health", "/updates?version=1.0.0"] {
        let response = reqwest::get(host.url(path)).await.unwrap();
        assert_eq!(response.status(), 500, "{path}");

        let text = response.text().await.unwrap();
        let body: ErrorResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(body.error, "Failed to read the version catalog");
        assert!(!text.contains(&*root.to_string_lossy()));
    }
}

#[tokio::test]
async fn test_download_latest_roundtrips_package() {
    let host = TestHost::start().await;

    let response = reqwest::get(host.url("/updates?version=LATEST")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/gzip"
    );
    assert_eq!(
        response.headers()["content-disposition"].to_str().unwrap(),
        "attachment; filename=\"2.1.0.tar.gz\""
    );

    let bytes = response.bytes().await.unwrap();
    let target = TempDir::new().unwrap();
    let out = target.path().join("out");
    archive::extract(bytes.as_ref(), &out).unwrap();

    assert_eq!(snapshot(&out), snapshot(&host.package_dir("2.1.0")));
}

#[tokio::test]
async fn test_missing_version_param_means_latest() {
    let host = TestHost::start().await;

    let response = reqwest::get(host.url("/updates")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-disposition"].to_str().unwrap(),
        "attachment; filename=\"2.1.0.tar.gz\""
    );
}

#[tokio::test]
async fn test_exact_version_is_trimmed_and_case_insensitive() {
    let host = TestHost::start().await;
    let client = reqwest::Client::new();

    let response = client
        .get(host.url("/updates"))
        .query(&[("version", " 1.0.0 ")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-disposition"].to_str().unwrap(),
        "attachment; filename=\"1.0.0.tar.gz\""
    );

    let response = client
        .get(host.url("/updates"))
        .query(&[("version", "latest")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_unknown_and_prerelease_versions_are_404() {
    let host = TestHost::start().await;

    for version in ["9.9.9", "1.0", "1.0.0-beta.1", "v1.0.0"] {
        let response = reqwest::Client::new()
            .get(host.url("/updates"))
            .query(&[("version", version)])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404, "{version}");

        let body: ErrorResponse = response.json().await.unwrap();
        assert_eq!(body.error, format!("Version not found: {version}"));
    }
}

#[tokio::test]
async fn test_empty_catalog_download_is_404() {
    let host = TestHost::start_with(TempDir::new().unwrap()).await;

    let response = reqwest::get(host.url("/updates?version=LATEST")).await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_traversal_is_403_and_leaks_no_path() {
    let host = TestHost::start().await;
    let root = host.packages.path().to_string_lossy().to_string();

    for version in ["../etc", "../../etc/passwd", "1.0.0/../2.1.0", "..", "/etc", "a\\b"] {
        let response = reqwest::Client::new()
            .get(host.url("/updates"))
            .query(&[("version", version)])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 403, "{version}");

        let text = response.text().await.unwrap();
        assert!(!text.contains(&root), "{version}: {text}");
        let body: ErrorResponse = serde_json::from_str(&text).unwrap();
        assert!(body.error.starts_with("Invalid version path"));
    }
}

#[tokio::test]
async fn test_response_streams_in_chunks() {
    use futures_util::StreamExt;

    let packages = TempDir::new().unwrap();
    let package = packages.path().join("3.0.0");
    std::fs::create_dir_all(&package).unwrap();
    // incompressible content well above one chunk
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let noise: Vec<u8> = (0..512 * 1024)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state >> 24) as u8
        })
        .collect();
    std::fs::write(package.join("blob.bin"), &noise).unwrap();

    let host = TestHost::start_with(packages).await;
    let response = reqwest::get(host.url("/updates?version=3.0.0")).await.unwrap();

    let mut stream = response.bytes_stream();
    let mut body = Vec::new();
    let mut chunks = 0;
    while let Some(chunk) = stream.next().await {
        body.extend_from_slice(&chunk.unwrap());
        chunks += 1;
    }
    assert!(chunks > 1);

    let target = TempDir::new().unwrap();
    let out = target.path().join("out");
    archive::extract(body.as_slice(), &out).unwrap();
    assert_eq!(std::fs::read(out.join("blob.bin")).unwrap(), noise);
}

#[tokio::test(flavor = "current_thread")]
async fn test_concurrent_requests_on_single_worker() {
    let host = TestHost::start().await;
    let client = reqwest::Client::new();

    let requests = (0..24).map(|i| {
        let path = match i % 3 {
            0 => "/versions",
            1 => "/health",
            _ => "/updates?version=1.0.0",
        };
        let request = client.get(host.url(path)).send();
        async move {
            let response = request.await.unwrap();
            let status = response.status();
            let body = response.bytes().await.unwrap();
            (path, status, body)
        }
    });

    let responses = futures_util::future::join_all(requests).await;
    assert_eq!(responses.len(), 24);
    for (path, status, body) in responses {
        assert_eq!(status, 200, "{path}");
        if path.starts_with("/updates") {
            let target = TempDir::new().unwrap();
            let out = target.path().join("out");
            archive::extract(body.as_ref(), &out).unwrap();
            assert_eq!(snapshot(&out), snapshot(&host.package_dir("1.0.0")));
        }
    }
}
