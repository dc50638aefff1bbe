//! Link resolution strategies against a local stand-in for the remote services.

use axum::extract::Path;
use axum::http::header;
use axum::response::{Html, IntoResponse, Redirect};
use axum::routing::get;
use axum::{Json, Router};
use litrag_ingestion::models::{ArticleRecord, RawArticle};
use litrag_ingestion::resolver::{LinkResolver, ResolverConfig};

const UNROUTABLE: &str = "http://127.0.0.1:1";

async fn pdf() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/pdf")], b"%PDF-1.4".to_vec())
}

async fn landing() -> impl IntoResponse {
    Html("<html><body>journal landing page</body></html>")
}

async fn unpaywall(Path(doi): Path<String>) -> impl IntoResponse {
    let location = if doi == "10.9999/oa.1" {
        serde_json::json!({
            "url_for_pdf": null,
            "pdf_url": "https://repository.example.org/oa/paper.pdf",
            "url": "https://repository.example.org/oa/paper"
        })
    } else {
        serde_json::Value::Null
    };
    Json(serde_json::json!({ "doi": doi, "best_oa_location": location }))
}

async fn spawn_server() -> String {
    let app = Router::new()
        .route("/science/article/pii/{pii}/pdfft", get(pdf))
        .route("/v2/{*doi}", get(unpaywall))
        .route("/10.9999/direct", get(|| async { Redirect::temporary("/files/final.pdf") }))
        .route("/10.9999/landing", get(|| async { Redirect::temporary("/article/landing") }))
        .route("/files/final.pdf", get(pdf))
        .route("/article/landing", get(landing))
        .route("/about-article", get(landing))
        .route("/dl/paper", get(pdf));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn article(doi: &str, links: &[&str]) -> RawArticle {
    let mut record = ArticleRecord::new("1", "Title");
    record.doi = Some(doi.to_string());
    RawArticle {
        record,
        cross_refs: vec![],
        inline_links: links.iter().map(|l| l.to_string()).collect(),
    }
}

fn config(base: &str) -> ResolverConfig {
    ResolverConfig {
        pmc_base_url: UNROUTABLE.into(),
        sciencedirect_base_url: base.into(),
        unpaywall_base_url: base.into(),
        doi_base_url: base.into(),
        unpaywall_email: None,
    }
}

#[tokio::test]
async fn test_elsevier_template_confirmed_by_probe() {
    let base = spawn_server().await;
    let resolver = LinkResolver::new(config(&base)).unwrap();

    let url = resolver.resolve(&article("10.1016/j.cell.2020.01.001", &[])).await;
    assert_eq!(
        url,
        Some(format!("{}/science/article/pii/j.cell.2020.01.001/pdfft", base))
    );
}

#[tokio::test]
async fn test_unpaywall_used_when_email_configured() {
    let base = spawn_server().await;
    let mut cfg = config(&base);
    cfg.unpaywall_email = Some("curator@example.org".into());
    let resolver = LinkResolver::new(cfg).unwrap();

    let url = resolver.resolve(&article("10.9999/oa.1", &[])).await;
    assert_eq!(url.as_deref(), Some("https://repository.example.org/oa/paper.pdf"));
}

#[tokio::test]
async fn test_doi_redirect_to_pdf() {
    let base = spawn_server().await;
    let resolver = LinkResolver::new(config(&base)).unwrap();

    let url = resolver.resolve(&article("10.9999/direct", &[])).await;
    assert_eq!(url, Some(format!("{}/files/final.pdf", base)));
}

#[tokio::test]
async fn test_doi_redirect_to_html_falls_back_to_inline_link() {
    let base = spawn_server().await;
    let mut cfg = config(&base);
    // Unpaywall has no location for this DOI
    cfg.unpaywall_email = Some("curator@example.org".into());
    let resolver = LinkResolver::new(cfg).unwrap();

    let url = resolver
        .resolve(&article("10.9999/landing", &["10.9999/landing", "https://pub.example.org/doc.PDF"]))
        .await;
    assert_eq!(url.as_deref(), Some("https://pub.example.org/doc.PDF"));
}

#[tokio::test]
async fn test_all_strategies_fail_soft() {
    let resolver = LinkResolver::new(config(UNROUTABLE)).unwrap();
    assert_eq!(resolver.resolve(&article("10.1016/j.x.1", &[])).await, None);
}

#[tokio::test]
async fn test_landing_page_scan_skips_non_pdf_candidates() {
    let base = spawn_server().await;
    let resolver = LinkResolver::new(config(&base)).unwrap();

    let page = r#"<html><body>
        <a href="/about-article">About this article</a>
        <a href="/dl/paper" class="btn pdf-link">Download</a>
    </body></html>"#;
    let url = resolver
        .find_pdf_link_in_html(page, &format!("{}/article/landing", base))
        .await;
    assert_eq!(url, Some(format!("{}/dl/paper", base)));
}
