//! Apartment composer: collects a customization and submits it.

pub mod catalog;

use serde::Serialize;

use crate::{
    db::ApartmentChoice, error::ValidationError, gateway::ApartmentGateway,
    session::SessionStore,
};

use catalog::{DEFAULT_LEFT_WALL, DEFAULT_RIGHT_WALL, MIRRORS, SOFAS, WALL_COLORS};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wall {
    Left,
    Right,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApartmentDraft {
    pub left_wall_color: Option<String>,
    pub right_wall_color: Option<String>,
    pub sofa: Option<String>,
    pub mirror: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
    pub choice: ApartmentChoice,
    /// False when the gateway write failed. The session still holds the choice.
    pub persisted: bool,
}

impl ApartmentDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Yellow and green walls with the first sofa and mirror.
    pub fn with_defaults() -> Self {
        Self {
            left_wall_color: Some(DEFAULT_LEFT_WALL.to_string()),
            right_wall_color: Some(DEFAULT_RIGHT_WALL.to_string()),
            sofa: Some(SOFAS[0].to_string()),
            mirror: Some(MIRRORS[0].to_string()),
        }
    }

    pub fn from_choice(choice: &ApartmentChoice) -> Self {
        Self {
            left_wall_color: Some(choice.left_wall_color.clone()),
            right_wall_color: Some(choice.right_wall_color.clone()),
            sofa: Some(choice.sofa.clone()),
            mirror: Some(choice.mirror.clone()),
        }
    }

    /// Set a wall from a palette hex value, a color name or a 1-based index.
    pub fn set_wall_color(&mut self, wall: Wall, value: &str) -> Result<&'static str, ValidationError> {
        let color = match value.trim().parse::<usize>() {
            Ok(index) => catalog::nth(&WALL_COLORS, index)
                .map(|(hex, _)| hex)
                .ok_or(ValidationError::UnknownChoice {
                    kind: "color",
                    index,
                    available: WALL_COLORS.len(),
                })?,
            Err(_) => catalog::find_color(value).ok_or_else(|| ValidationError::UnknownColor {
                value: value.trim().to_string(),
            })?,
        };

        let slot = match wall {
            Wall::Left => &mut self.left_wall_color,
            Wall::Right => &mut self.right_wall_color,
        };
        *slot = Some(color.to_string());
        Ok(color)
    }

    pub fn pick_sofa(&mut self, index: usize) -> Result<&'static str, ValidationError> {
        let sofa = catalog::nth(&SOFAS, index).ok_or(ValidationError::UnknownChoice {
            kind: "sofa",
            index,
            available: SOFAS.len(),
        })?;
        self.sofa = Some(sofa.to_string());
        Ok(sofa)
    }

    pub fn pick_mirror(&mut self, index: usize) -> Result<&'static str, ValidationError> {
        let mirror = catalog::nth(&MIRRORS, index).ok_or(ValidationError::UnknownChoice {
            kind: "mirror",
            index,
            available: MIRRORS.len(),
        })?;
        self.mirror = Some(mirror.to_string());
        Ok(mirror)
    }

    pub fn is_complete(&self) -> bool {
        self.to_choice().is_some()
    }

    pub fn to_choice(&self) -> Option<ApartmentChoice> {
        Some(ApartmentChoice {
            left_wall_color: non_empty(&self.left_wall_color)?,
            right_wall_color: non_empty(&self.right_wall_color)?,
            sofa: non_empty(&self.sofa)?,
            mirror: non_empty(&self.mirror)?,
        })
    }

    /// Store the draft on the current voter, then persist it.
    ///
    /// A failed write is logged and reported through
    /// [`SubmitOutcome::persisted`]; it never blocks the caller.
    pub async fn submit<G: ApartmentGateway>(
        &self,
        session: &SessionStore,
        gateway: &G,
    ) -> Result<SubmitOutcome, ValidationError> {
        let email = session.email().ok_or(ValidationError::NotLoggedIn)?;
        let choice = self.to_choice().ok_or(ValidationError::IncompleteApartment)?;

        session.set_apartment(choice.clone());

        let persisted = match gateway.upsert_apartment(&email, &choice).await {
            Ok(listing) => {
                log_info!("Saved apartment for {} (votes {})", listing.email, listing.votes);
                true
            }
            Err(err) => {
                log_warn!("Apartment for {email} was not saved: {err:#}");
                false
            }
        };

        Ok(SubmitOutcome { choice, persisted })
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
