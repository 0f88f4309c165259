use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Class, ClassStatus};
use crate::resp::problem::{problems, Problem};

fn validate_price(price: f64) -> Result<(), Problem> {
    if !price.is_finite() || price <= 0.0 {
        return Err(problems::bad_request("Price must be a positive amount.")
            .insert("price", price)
            .clone());
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<(), Problem> {
    if title.trim().is_empty() {
        return Err(problems::bad_request("Title can't be empty."));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassCreateData {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "image")]
    pub image_url: Option<String>,
    pub price: f64,
}

impl ClassCreateData {
    pub fn validate(&self) -> Result<(), Problem> {
        validate_title(&self.title)?;
        validate_price(self.price)
    }

    /// New classes always start out pending review.
    pub fn into_class(self, teacher_id: Uuid) -> Class {
        Class {
            id: Uuid::new_v4(),
            teacher_id,
            title: self.title.trim().to_string(),
            description: self.description,
            image_url: self.image_url,
            price: self.price,
            status: ClassStatus::Pending,
            total_enrollment: 0,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClassUpdateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
}

impl ClassUpdateData {
    pub fn validate(&self) -> Result<(), Problem> {
        if let Some(title) = &self.title {
            validate_title(title)?;
        }
        if let Some(price) = self.price {
            validate_price(price)?;
        }
        Ok(())
    }

    /// Trims the title the same way [`ClassCreateData::into_class`] does,
    /// so every store persists the same value.
    pub fn normalized(mut self) -> ClassUpdateData {
        self.title = self.title.map(|it| it.trim().to_string());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.image_url.is_none()
            && self.price.is_none()
    }

    pub fn apply(&self, class: &mut Class) {
        if let Some(title) = &self.title {
            class.title = title.clone();
        }
        if let Some(description) = &self.description {
            class.description = description.clone();
        }
        if let Some(image_url) = &self.image_url {
            class.image_url = Some(image_url.clone());
        }
        if let Some(price) = self.price {
            class.price = price;
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ClassStatusData {
    pub status: ClassStatus,
}
