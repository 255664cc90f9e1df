//! Card catalog - static card definitions shared by every room

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Whether a card spawns a moving unit or a stationary building
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardCategory {
    Unit,
    Building,
}

/// Base stats for a card. Fields that don't apply to the category are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardStats {
    pub hit_points: u32,
    /// Damage per hit (0 = never attacks)
    #[serde(default)]
    pub damage: u32,
    /// Attack reach in arena units
    #[serde(default)]
    pub range: f32,
    /// Seconds between hits
    #[serde(default = "default_attack_interval")]
    pub attack_interval: f32,
    /// Arena units per second (units only)
    #[serde(default)]
    pub speed: Option<f32>,
    /// Seconds until the building expires
    #[serde(default)]
    pub lifetime: Option<f32>,
    /// Seconds per elixir point generated (buildings only)
    #[serde(default)]
    pub generation_interval: Option<f32>,
}

fn default_attack_interval() -> f32 {
    1.0
}

/// An immutable card definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardDefinition {
    pub id: String,
    pub cost: u32,
    pub category: CardCategory,
    pub stats: CardStats,
}

/// Catalog loading errors
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read card catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse card catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Duplicate card id: {0}")]
    Duplicate(String),

    #[error("Card {0} is invalid: {1}")]
    Invalid(String, &'static str),
}

/// Read-only lookup from card id to definition
#[derive(Debug, Clone)]
pub struct CardCatalog {
    cards: HashMap<String, Arc<CardDefinition>>,
}

impl CardCatalog {
    /// Build a catalog, rejecting duplicates and inconsistent stat bundles
    pub fn new(cards: Vec<CardDefinition>) -> Result<Self, CatalogError> {
        let mut map = HashMap::with_capacity(cards.len());
        for card in cards {
            validate(&card)?;
            if map.contains_key(&card.id) {
                return Err(CatalogError::Duplicate(card.id));
            }
            map.insert(card.id.clone(), Arc::new(card));
        }
        Ok(Self { cards: map })
    }

    /// Parse a JSON array of card definitions
    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let cards: Vec<CardDefinition> = serde_json::from_str(json)?;
        Self::new(cards)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// The built-in card set
    pub fn standard() -> Self {
        let cards = vec![
            unit("knight", 3, 600, 75, 1.2, 1.2, 1.5),
            unit("archers", 3, 250, 40, 5.0, 0.9, 1.5),
            unit("giant", 5, 1800, 120, 1.2, 1.5, 0.9),
            unit("skeletons", 1, 80, 35, 1.0, 1.0, 2.0),
            CardDefinition {
                id: "cannon".to_string(),
                cost: 3,
                category: CardCategory::Building,
                stats: CardStats {
                    hit_points: 500,
                    damage: 60,
                    range: 5.5,
                    attack_interval: 0.8,
                    speed: None,
                    lifetime: Some(30.0),
                    generation_interval: None,
                },
            },
            CardDefinition {
                id: "elixir_pump".to_string(),
                cost: 4,
                category: CardCategory::Building,
                stats: CardStats {
                    hit_points: 300,
                    damage: 0,
                    range: 0.0,
                    attack_interval: 1.0,
                    speed: None,
                    lifetime: Some(60.0),
                    generation_interval: Some(8.5),
                },
            },
        ];

        Self {
            cards: cards
                .into_iter()
                .map(|c| (c.id.clone(), Arc::new(c)))
                .collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<CardDefinition>> {
        self.cards.get(id)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }
}

impl Default for CardCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

fn unit(
    id: &str,
    cost: u32,
    hit_points: u32,
    damage: u32,
    range: f32,
    attack_interval: f32,
    speed: f32,
) -> CardDefinition {
    CardDefinition {
        id: id.to_string(),
        cost,
        category: CardCategory::Unit,
        stats: CardStats {
            hit_points,
            damage,
            range,
            attack_interval,
            speed: Some(speed),
            lifetime: None,
            generation_interval: None,
        },
    }
}

fn validate(card: &CardDefinition) -> Result<(), CatalogError> {
    let invalid = |reason| Err(CatalogError::Invalid(card.id.clone(), reason));
    let stats = &card.stats;

    if card.id.is_empty() {
        return invalid("empty id");
    }
    if stats.hit_points == 0 {
        return invalid("hit_points must be positive");
    }
    if !(stats.attack_interval > 0.0) || !(stats.range >= 0.0) {
        return invalid("attack stats must be positive");
    }
    match card.category {
        CardCategory::Unit => match stats.speed {
            Some(speed) if speed > 0.0 => {}
            _ => return invalid("unit needs a positive speed"),
        },
        CardCategory::Building => {
            if stats.speed.is_some() {
                return invalid("building cannot move");
            }
            if !matches!(stats.lifetime, Some(l) if l > 0.0) {
                return invalid("building needs a positive lifetime");
            }
        }
    }
    if let Some(interval) = stats.generation_interval {
        if card.category != CardCategory::Building || !(interval > 0.0) {
            return invalid("only buildings generate elixir");
        }
    }
    Ok(())
}
