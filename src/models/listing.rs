//! The listing aggregate: a classified ad plus the photos it owns.
//!
//! Fields are private to this module. A `Listing` is created through
//! [`Listing::create`], rebuilt from storage through [`Listing::reconstitute`],
//! and changed only through the named operations below, each of which
//! validates before it mutates.

use crate::errors::{ListingError, ListingResult};
use crate::models::photo::ListingPhoto;
use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

pub const MAX_PHOTOS: usize = 10;
pub const MIN_TITLE_LEN: usize = 3;
pub const MAX_TITLE_LEN: usize = 120;
pub const MAX_DESCRIPTION_LEN: usize = 5000;

/// Number of fractional digits every price is normalised to.
const PRICE_SCALE: i64 = 2;

/// Lifecycle state of a listing. Transitions only move forward.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Draft,
    Published,
    Archived,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Published => "PUBLISHED",
            Self::Archived => "ARCHIVED",
        }
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = ListingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DRAFT" => Ok(Self::Draft),
            "PUBLISHED" => Ok(Self::Published),
            "ARCHIVED" => Ok(Self::Archived),
            other => Err(ListingError::InvalidArgument(format!(
                "unknown listing status `{other}`"
            ))),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Electronics,
    Vehicles,
    RealEstate,
    Jobs,
    Services,
    HomeAndGarden,
    Fashion,
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electronics => "ELECTRONICS",
            Self::Vehicles => "VEHICLES",
            Self::RealEstate => "REAL_ESTATE",
            Self::Jobs => "JOBS",
            Self::Services => "SERVICES",
            Self::HomeAndGarden => "HOME_AND_GARDEN",
            Self::Fashion => "FASHION",
            Self::Other => "OTHER",
        }
    }
}

impl FromStr for Category {
    type Err = ListingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ELECTRONICS" => Ok(Self::Electronics),
            "VEHICLES" => Ok(Self::Vehicles),
            "REAL_ESTATE" => Ok(Self::RealEstate),
            "JOBS" => Ok(Self::Jobs),
            "SERVICES" => Ok(Self::Services),
            "HOME_AND_GARDEN" => Ok(Self::HomeAndGarden),
            "FASHION" => Ok(Self::Fashion),
            "OTHER" => Ok(Self::Other),
            other => Err(ListingError::InvalidArgument(format!(
                "unknown category `{other}`"
            ))),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Uah,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "USD",
            Self::Eur => "EUR",
            Self::Gbp => "GBP",
            Self::Uah => "UAH",
        }
    }
}

impl FromStr for Currency {
    type Err = ListingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "USD" => Ok(Self::Usd),
            "EUR" => Ok(Self::Eur),
            "GBP" => Ok(Self::Gbp),
            "UAH" => Ok(Self::Uah),
            other => Err(ListingError::InvalidArgument(format!(
                "unknown currency `{other}`"
            ))),
        }
    }
}

/// A non-negative amount in a single currency, always held at scale 2.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Money {
    amount: BigDecimal,
    currency: Currency,
}

impl Money {
    /// Build a price, rounding half-up to two decimal places.
    pub fn new(amount: BigDecimal, currency: Currency) -> ListingResult<Self> {
        if amount < BigDecimal::from(0) {
            return Err(ListingError::InvalidArgument(
                "price amount cannot be negative".into(),
            ));
        }
        Ok(Self {
            amount: amount.with_scale_round(PRICE_SCALE, RoundingMode::HalfUp),
            currency,
        })
    }

    pub fn amount(&self) -> &BigDecimal {
        &self.amount
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency.as_str())
    }
}

/// Raw listing state as read back from a store.
#[derive(Debug, Clone)]
pub struct ListingParts {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: Money,
    pub category: Category,
    pub status: ListingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
    pub photos: Vec<ListingPhoto>,
}

#[derive(Serialize, Clone, Debug)]
pub struct Listing {
    id: Uuid,
    title: String,
    description: String,
    price: Money,
    category: Category,
    status: ListingStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// `None` until the first successful write.
    version: Option<i64>,
    photos: Vec<ListingPhoto>,
}

impl Listing {
    /// Create a new draft listing. Title and description are trimmed.
    pub fn create(
        title: &str,
        description: Option<&str>,
        price: Money,
        category: Category,
    ) -> ListingResult<Self> {
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            title: normalize_title(title)?,
            description: normalize_description(description)?,
            price,
            category,
            status: ListingStatus::Draft,
            created_at: now,
            updated_at: now,
            version: None,
            photos: Vec::new(),
        })
    }

    /// Rebuild a persisted listing, re-checking the invariants a store could
    /// have let slip.
    pub fn reconstitute(parts: ListingParts) -> ListingResult<Self> {
        if parts.version < 0 {
            return Err(ListingError::InvalidArgument(format!(
                "listing `{}` has negative version {}",
                parts.id, parts.version
            )));
        }
        if parts.photos.len() > MAX_PHOTOS {
            return Err(ListingError::InvalidArgument(format!(
                "listing `{}` holds {} photos, above the limit of {MAX_PHOTOS}",
                parts.id,
                parts.photos.len()
            )));
        }
        if let Some(stray) = parts.photos.iter().find(|p| p.listing_id() != parts.id) {
            return Err(ListingError::InvalidArgument(format!(
                "photo `{}` does not belong to listing `{}`",
                stray.id(),
                parts.id
            )));
        }

        Ok(Self {
            id: parts.id,
            title: parts.title,
            description: parts.description,
            price: parts.price,
            category: parts.category,
            status: parts.status,
            created_at: parts.created_at,
            updated_at: parts.updated_at,
            version: Some(parts.version),
            photos: parts.photos,
        })
    }

    /// DRAFT → PUBLISHED.
    pub fn publish(&mut self) -> ListingResult<()> {
        self.transition(ListingStatus::Draft, ListingStatus::Published)
    }

    /// PUBLISHED → ARCHIVED.
    pub fn archive(&mut self) -> ListingResult<()> {
        self.transition(ListingStatus::Published, ListingStatus::Archived)
    }

    fn transition(&mut self, required: ListingStatus, next: ListingStatus) -> ListingResult<()> {
        if self.status != required {
            return Err(ListingError::InvalidStateTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.touch();
        Ok(())
    }

    /// Append a photo, keeping insertion order.
    pub fn add_photo(&mut self, photo: ListingPhoto) -> ListingResult<()> {
        if photo.listing_id() != self.id {
            return Err(ListingError::InvalidArgument(format!(
                "photo `{}` belongs to listing `{}`, not `{}`",
                photo.id(),
                photo.listing_id(),
                self.id
            )));
        }
        if self.photos.len() >= MAX_PHOTOS {
            return Err(ListingError::PhotoLimitExceeded {
                max: MAX_PHOTOS,
                current: self.photos.len(),
                attempted: 1,
            });
        }
        self.photos.push(photo);
        self.touch();
        Ok(())
    }

    pub fn update_title(&mut self, title: &str) -> ListingResult<()> {
        self.title = normalize_title(title)?;
        self.touch();
        Ok(())
    }

    pub fn update_description(&mut self, description: Option<&str>) -> ListingResult<()> {
        self.description = normalize_description(description)?;
        self.touch();
        Ok(())
    }

    pub fn update_price(&mut self, price: Money) {
        self.price = price;
        self.touch();
    }

    pub fn update_category(&mut self, category: Category) {
        self.category = category;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn price(&self) -> &Money {
        &self.price
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn status(&self) -> ListingStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> Option<i64> {
        self.version
    }

    pub fn photos(&self) -> &[ListingPhoto] {
        &self.photos
    }

    pub fn photo_count(&self) -> usize {
        self.photos.len()
    }

    pub fn remaining_photo_slots(&self) -> usize {
        MAX_PHOTOS.saturating_sub(self.photos.len())
    }
}

fn normalize_title(title: &str) -> ListingResult<String> {
    let trimmed = title.trim();
    let len = trimmed.chars().count();
    if !(MIN_TITLE_LEN..=MAX_TITLE_LEN).contains(&len) {
        return Err(ListingError::InvalidArgument(format!(
            "title must be between {MIN_TITLE_LEN} and {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn normalize_description(description: Option<&str>) -> ListingResult<String> {
    let trimmed = description.unwrap_or_default().trim();
    if trimmed.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ListingError::InvalidArgument(format!(
            "description cannot exceed {MAX_DESCRIPTION_LEN} characters"
        )));
    }
    Ok(trimmed.to_string())
}
