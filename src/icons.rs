use crate::types::to_checksum;
use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::types::Address;

/// Best-effort token icon lookup. Any error is treated as "no icon".
#[async_trait]
pub trait IconResolver: Send + Sync {
    async fn icon_url(&self, token: Address, chain_id: u64) -> Result<Option<String>>;
}

/// Resolver for deployments without icons.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoIcons;

#[async_trait]
impl IconResolver for NoIcons {
    async fn icon_url(&self, _token: Address, _chain_id: u64) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Builds icon URLs from a template such as
/// `https://assets.example.org/{chain_id}/{address}/logo.png`.
///
/// Placeholders: `{chain_id}`, `{address}` (checksummed), `{address_lower}`.
#[derive(Debug, Clone)]
pub struct TemplateIconResolver {
    template: String,
}

impl TemplateIconResolver {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn render(&self, token: Address, chain_id: u64) -> Result<String> {
        let rendered = self
            .template
            .replace("{chain_id}", &chain_id.to_string())
            .replace("{address_lower}", &format!("{:?}", token))
            .replace("{address}", &to_checksum(&token));
        url::Url::parse(&rendered).with_context(|| format!("invalid icon url {}", rendered))?;
        Ok(rendered)
    }
}

#[async_trait]
impl IconResolver for TemplateIconResolver {
    async fn icon_url(&self, token: Address, chain_id: u64) -> Result<Option<String>> {
        self.render(token, chain_id).map(Some)
    }
}
