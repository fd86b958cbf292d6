//! Client registry models

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::UnknownVariant;

/// A farm or grower buying agro-inputs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: Uuid,
    pub name: String,
    pub status: ClientStatus,
    pub crop_type: Option<String>,
    pub hectares: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

/// Commercial status of a client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientStatus {
    Prospecto,
    Activo,
    Inactivo,
}

impl ClientStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientStatus::Prospecto => "Prospecto",
            ClientStatus::Activo => "Activo",
            ClientStatus::Inactivo => "Inactivo",
        }
    }
}

impl FromStr for ClientStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Prospecto" => Ok(ClientStatus::Prospecto),
            "Activo" => Ok(ClientStatus::Activo),
            "Inactivo" => Ok(ClientStatus::Inactivo),
            _ => Err(UnknownVariant::new("client status", s)),
        }
    }
}
