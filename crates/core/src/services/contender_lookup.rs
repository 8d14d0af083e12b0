//! Contender lookup service.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;
use votebattle_common::{AppError, AppResult, LookupConfig};

/// An entity that can take part in a battle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contender {
    /// Catalogue identifier.
    pub id: i32,
    /// Display name.
    pub name: String,
    /// Image URL, if the catalogue has one.
    pub sprite_url: Option<String>,
    /// Height in decimetres.
    pub height: u32,
    /// Weight in hectograms.
    pub weight: u32,
    /// Base experience, missing for some entries.
    pub base_experience: Option<u32>,
}

impl Contender {
    /// A contender known only by id and name.
    #[must_use]
    pub fn named(id: i32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            sprite_url: None,
            height: 0,
            weight: 0,
            base_experience: None,
        }
    }
}

/// Source of contenders.
#[async_trait]
pub trait ContenderLookup: Send + Sync {
    /// Fetch one contender. Unknown ids are `AppError::NotFound`.
    async fn get_by_id(&self, id: i32) -> AppResult<Contender>;

    /// Draw two contenders at random. They are not guaranteed to differ.
    async fn get_random_pair(&self) -> AppResult<(Contender, Contender)>;
}

/// Catalogue entry as served over HTTP.
#[derive(Debug, Deserialize)]
struct ApiContender {
    id: i32,
    name: String,
    #[serde(default)]
    sprites: ApiSprites,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    weight: u32,
    base_experience: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiSprites {
    front_default: Option<String>,
    #[serde(default)]
    other: ApiOtherSprites,
}

#[derive(Debug, Default, Deserialize)]
struct ApiOtherSprites {
    #[serde(rename = "official-artwork", default)]
    official_artwork: ApiArtwork,
}

#[derive(Debug, Default, Deserialize)]
struct ApiArtwork {
    front_default: Option<String>,
}

impl From<ApiContender> for Contender {
    fn from(api: ApiContender) -> Self {
        let sprite_url = api
            .sprites
            .other
            .official_artwork
            .front_default
            .or(api.sprites.front_default);
        Self {
            id: api.id,
            name: api.name,
            sprite_url,
            height: api.height,
            weight: api.weight,
            base_experience: api.base_experience,
        }
    }
}

/// Lookup against a REST catalogue serving `{base_url}/{id}`.
#[derive(Clone)]
pub struct HttpContenderLookup {
    config: LookupConfig,
    http_client: reqwest::Client,
}

impl HttpContenderLookup {
    /// Create a new lookup client.
    pub fn new(config: LookupConfig) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    fn random_id(&self) -> i32 {
        rand::thread_rng().gen_range(1..=self.config.pool_size.max(1))
    }
}

#[async_trait]
impl ContenderLookup for HttpContenderLookup {
    async fn get_by_id(&self, id: i32) -> AppResult<Contender> {
        let url = format!("{}/{id}", self.config.base_url.trim_end_matches('/'));

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| AppError::ExternalService(format!("Contender request failed: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(AppError::NotFound(format!("Contender not found: {id}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "Contender API error: {status} - {body}"
            )));
        }

        let api: ApiContender = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Failed to parse contender response: {e}"))
        })?;

        debug!(id, name = %api.name, "Fetched contender");
        Ok(api.into())
    }

    async fn get_random_pair(&self) -> AppResult<(Contender, Contender)> {
        let (first, second) = (self.random_id(), self.random_id());
        futures::future::try_join(self.get_by_id(first), self.get_by_id(second)).await
    }
}

/// Lookup over a fixed in-memory catalogue.
#[derive(Debug, Clone, Default)]
pub struct StaticContenderLookup {
    contenders: Vec<Contender>,
}

impl StaticContenderLookup {
    /// Create a lookup over `contenders`.
    #[must_use]
    pub const fn new(contenders: Vec<Contender>) -> Self {
        Self { contenders }
    }
}

#[async_trait]
impl ContenderLookup for StaticContenderLookup {
    async fn get_by_id(&self, id: i32) -> AppResult<Contender> {
        self.contenders
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Contender not found: {id}")))
    }

    async fn get_random_pair(&self) -> AppResult<(Contender, Contender)> {
        let mut rng = rand::thread_rng();
        match (
            self.contenders.choose(&mut rng),
            self.contenders.choose(&mut rng),
        ) {
            (Some(a), Some(b)) => Ok((a.clone(), b.clone())),
            _ => Err(AppError::NotFound("Contender catalogue is empty".to_string())),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_api_payload_prefers_official_artwork() {
        let json = r#"{
            "id": 25,
            "name": "pikachu",
            "height": 4,
            "weight": 60,
            "base_experience": 112,
            "sprites": {
                "front_default": "https://img/front/25.png",
                "other": { "official-artwork": { "front_default": "https://img/art/25.png" } }
            }
        }"#;

        let contender = Contender::from(serde_json::from_str::<ApiContender>(json).unwrap());

        assert_eq!(contender.id, 25);
        assert_eq!(contender.name, "pikachu");
        assert_eq!(contender.sprite_url.as_deref(), Some("https://img/art/25.png"));
        assert_eq!(contender.base_experience, Some(112));
    }

    #[test]
    fn test_api_payload_with_sparse_sprites() {
        let json = r#"{
            "id": 1,
            "name": "bulbasaur",
            "base_experience": null,
            "sprites": { "front_default": "https://img/front/1.png", "other": {} }
        }"#;

        let contender = Contender::from(serde_json::from_str::<ApiContender>(json).unwrap());

        assert_eq!(contender.sprite_url.as_deref(), Some("https://img/front/1.png"));
        assert_eq!(contender.base_experience, None);
        assert_eq!(contender.height, 0);
    }

    #[tokio::test]
    async fn test_static_lookup() {
        let lookup = StaticContenderLookup::new(vec![
            Contender::named(1, "bulbasaur"),
            Contender::named(25, "pikachu"),
        ]);

        assert_eq!(lookup.get_by_id(25).await.unwrap().name, "pikachu");
        assert!(matches!(
            lookup.get_by_id(3).await,
            Err(AppError::NotFound(_))
        ));

        let (a, b) = lookup.get_random_pair().await.unwrap();
        assert!([1, 25].contains(&a.id));
        assert!([1, 25].contains(&b.id));
    }

    #[tokio::test]
    async fn test_empty_static_lookup_has_no_pair() {
        let lookup = StaticContenderLookup::default();
        assert!(lookup.get_random_pair().await.is_err());
    }

    #[test]
    fn test_random_id_stays_in_pool() {
        let lookup = HttpContenderLookup::new(LookupConfig {
            pool_size: 3,
            ..Default::default()
        })
        .unwrap();

        for _ in 0..100 {
            assert!((1..=3).contains(&lookup.random_id()));
        }
    }

    #[tokio::test]
    #[ignore = "requires network access"]
    async fn test_http_lookup_fetches_contender() {
        let lookup = HttpContenderLookup::new(LookupConfig::default()).unwrap();
        let contender = lookup.get_by_id(25).await.unwrap();
        assert_eq!(contender.name, "pikachu");
    }
}
