//! Web page fetching
//!
//! Fetches a page and extracts its title and outgoing links.

use reqwest::Client;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::NetError;

/// Title and links of a fetched page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    pub title: Option<String>,
    pub links: Vec<String>,
}

/// A fetched page with its response headers
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// GET a URL, returning status, headers and body
pub async fn fetch_page(client: &Client, url: &str) -> Result<FetchedPage, NetError> {
    debug!("Fetching: {}", url);

    let response = client.get(url).send().await?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().to_string(),
            )
        })
        .collect();
    let body = response.text().await?;

    Ok(FetchedPage {
        url: url.to_string(),
        status,
        headers,
        body,
    })
}

/// Extract the title and every `href` from an HTML document
pub fn summarize_html(html: &str) -> PageSummary {
    let document = Html::parse_document(html);

    let title = Selector::parse("title").ok().and_then(|selector| {
        document
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|title| !title.is_empty())
    });

    let links = Selector::parse("a[href]")
        .map(|selector| {
            document
                .select(&selector)
                .filter_map(|el| el.value().attr("href"))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    PageSummary { title, links }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_html() {
        let html = r#"
            <html>
            <head><title> Example Domain </title></head>
            <body>
                <a href="https://www.iana.org/domains/example">More</a>
                <a name="anchor">No href</a>
                <a href="/about">About</a>
            </body>
            </html>
        "#;

        let summary = summarize_html(html);
        assert_eq!(summary.title.as_deref(), Some("Example Domain"));
        assert_eq!(
            summary.links,
            vec!["https://www.iana.org/domains/example".to_string(), "/about".to_string()]
        );
    }

    #[test]
    fn test_summarize_without_title() {
        let summary = summarize_html("<html><body><p>hi</p></body></html>");
        assert!(summary.title.is_none());
        assert!(summary.links.is_empty());
    }
}
