//! Bounty-backed resource requests

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Open,
    Fulfilled,
    Closed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::Fulfilled => "fulfilled",
            RequestStatus::Closed => "closed",
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(RequestStatus::Open),
            "fulfilled" => Ok(RequestStatus::Fulfilled),
            "closed" => Ok(RequestStatus::Closed),
            other => Err(format!("Unknown request status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BountyRequest {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    /// Points held in escrow while the request is open
    pub bounty: i64,
    pub status: RequestStatus,
    pub user_id: Uuid,
    pub fulfiller_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BountyRequest {
    pub fn from_new(new: NewRequest) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: new.title,
            description: new.description,
            bounty: new.bounty,
            status: RequestStatus::Open,
            user_id: new.user_id,
            fulfiller_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewRequest {
    pub title: String,
    pub description: String,
    pub bounty: i64,
    pub user_id: Uuid,
}

/// How an open request releases its escrow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Settlement {
    /// Pay the bounty to the user who supplied the resource
    Fulfill {
        #[serde(rename = "fulfillerId")]
        fulfiller_id: Uuid,
    },
    /// Refund the bounty to the poster
    Close,
}

impl Settlement {
    pub fn target_status(&self) -> RequestStatus {
        match self {
            Settlement::Fulfill { .. } => RequestStatus::Fulfilled,
            Settlement::Close => RequestStatus::Closed,
        }
    }

    /// Wallet that receives the escrowed points
    pub fn beneficiary(&self, poster: Uuid) -> Uuid {
        match self {
            Settlement::Fulfill { fulfiller_id } => *fulfiller_id,
            Settlement::Close => poster,
        }
    }
}
