//! HTTP 目录服务（reqwest）
//!
//! GET 请求一律带 `Authorization: Bearer <token>`；401 映射为 Unauthorized，
//! reqwest 超时映射为 Timeout，其余非 2xx 映射为 Http。
//! 列表响应同时接受 `{"rows": [...]}` 与裸阵列两种形态。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::catalog::RawChannelRow;
use crate::config::RemoteSection;
use crate::core::RemoteError;
use crate::remote::{CatalogService, ChannelFilter, MasterFilter, MasterPage};

/// 列表响应的两种形态
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RowsPayload<T> {
    Wrapped { rows: Vec<T> },
    Bare(Vec<T>),
}

impl<T> RowsPayload<T> {
    fn into_rows(self) -> Vec<T> {
        match self {
            Self::Wrapped { rows } => rows,
            Self::Bare(rows) => rows,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    #[serde(alias = "displayName", alias = "name")]
    display_name: String,
}

/// 基于 reqwest 的目录服务客户端
pub struct HttpCatalogService {
    client: Client,
    base_url: String,
    master_path: String,
    channel_path: String,
    detail_path: String,
    verify_path: String,
    batch_lookup: bool,
}

fn map_send_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Timeout
    } else {
        RemoteError::Network(e.to_string())
    }
}

impl HttpCatalogService {
    pub fn new(remote: &RemoteSection) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(remote.request_timeout_secs.max(1)))
            .build()
            .map_err(|e| RemoteError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: remote.base_url.trim_end_matches('/').to_string(),
            master_path: remote.master_path.clone(),
            channel_path: remote.channel_path.clone(),
            detail_path: remote.detail_path.clone(),
            verify_path: remote.verify_path.clone(),
            batch_lookup: remote.batch_lookup,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send(
        &self,
        token: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<reqwest::Response, RemoteError> {
        tracing::debug!("GET {} {:?}", url, query);
        let resp = self
            .client
            .get(url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(RemoteError::Unauthorized);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RemoteError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(resp)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        token: &str,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, RemoteError> {
        let resp = self.send(token, url, query).await?;
        resp.json::<T>().await.map_err(|e| {
            if e.is_timeout() {
                RemoteError::Timeout
            } else {
                RemoteError::Parse(e.to_string())
            }
        })
    }
}

#[async_trait]
impl CatalogService for HttpCatalogService {
    fn supports_batch_lookup(&self) -> bool {
        self.batch_lookup
    }

    async fn fetch_master_page(
        &self,
        token: &str,
        filter: &MasterFilter,
        page: u32,
    ) -> Result<MasterPage, RemoteError> {
        let mut query = vec![("page", page.to_string())];
        match filter {
            MasterFilter::Keys(keys) => query.push(("keys", keys.join(","))),
            MasterFilter::NameKeyword(keyword) => query.push(("name", keyword.clone())),
            MasterFilter::All => {}
        }
        let url = self.url(&self.master_path);
        let mut result: MasterPage = self.get_json(token, &url, &query).await?;
        if result.page == 0 {
            result.page = page;
        }
        Ok(result)
    }

    async fn fetch_channel_records(
        &self,
        token: &str,
        filter: &ChannelFilter,
    ) -> Result<Vec<RawChannelRow>, RemoteError> {
        let query = match filter {
            ChannelFilter::Keys(keys) => vec![("keys", keys.join(","))],
            ChannelFilter::Channel(channel) => vec![("channel", channel.clone())],
            ChannelFilter::All => Vec::new(),
        };
        let url = self.url(&self.channel_path);
        let payload: RowsPayload<RawChannelRow> = self.get_json(token, &url, &query).await?;
        Ok(payload.into_rows())
    }

    async fn fetch_detail(&self, token: &str, key: &str) -> Result<String, RemoteError> {
        let url = format!("{}/{}", self.url(&self.detail_path), key);
        let detail: DetailResponse = self.get_json(token, &url, &[]).await?;
        Ok(detail.display_name)
    }

    async fn verify_credential(&self, token: &str) -> Result<bool, RemoteError> {
        let url = self.url(&self.verify_path);
        match self.send(token, &url, &[]).await {
            Ok(_) => Ok(true),
            Err(RemoteError::Unauthorized) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let remote = RemoteSection {
            base_url: "https://catalog.example/".to_string(),
            ..RemoteSection::default()
        };
        let service = HttpCatalogService::new(&remote).unwrap();
        assert_eq!(
            service.url("/api/products"),
            "https://catalog.example/api/products"
        );
    }

    #[test]
    fn test_rows_payload_accepts_both_shapes() {
        let wrapped: RowsPayload<RawChannelRow> =
            serde_json::from_str(r#"{"rows":[{"key":"P1","channel":"AG","saleStart":"2024-01-01","saleEnd":"2024-12-31"}]}"#)
                .unwrap();
        let bare: RowsPayload<RawChannelRow> =
            serde_json::from_str(r#"[{"productCode":"P1","channelId":"AG","sale_start":"2024-01-01","sale_end":"2024-12-31"}]"#)
                .unwrap();
        assert_eq!(wrapped.into_rows(), bare.into_rows());
    }

    #[test]
    fn test_master_page_camel_case() {
        let page: MasterPage = serde_json::from_str(
            r#"{"rows":[{"productCode":"P1","productName":"Plan","attributes":{"currency":"1"},"saleStart":"2024-01-01","saleEnd":"9999-12-31"}],"page":1,"totalPages":3}"#,
        )
        .unwrap();
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.rows[0].key, "P1");
        assert_eq!(page.rows[0].attributes.get("currency").map(String::as_str), Some("1"));
    }
}
