//! Top-level application controller.
//!
//! Owns the session, the composer draft and, while the ranking is open, one
//! [`VoteEngine`]. Front ends drive everything through this type.

use std::{fs, sync::Arc};

use anyhow::{Context, Result};
use tokio::sync::broadcast;

use crate::{
    composer::{ApartmentDraft, SubmitOutcome},
    config::AppConfig,
    db::Database,
    error::ValidationError,
    gateway::{ApartmentGateway, SqliteGateway},
    ranking::RankedApartment,
    session::{validate_email, SessionStore, Voter},
    votes::{EngineEvent, ToggleOutcome, VoteEngine, VoteSnapshot},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub struct AppController<G> {
    gateway: Arc<G>,
    session: SessionStore,
    draft: ApartmentDraft,
    engine: Option<VoteEngine<G>>,
}

impl AppController<SqliteGateway> {
    /// Open the database and session slot under the configured data dir.
    pub fn open(config: &AppConfig) -> Result<Self> {
        fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("Failed to create data directory {}", config.data_dir.display())
        })?;

        let database = Database::new(config.database_path())?;
        let gateway = Arc::new(SqliteGateway::new(database));
        let session = SessionStore::open(config.session_path());
        Ok(Self::with_gateway(gateway, session))
    }
}

impl<G: ApartmentGateway + 'static> AppController<G> {
    pub fn with_gateway(gateway: Arc<G>, session: SessionStore) -> Self {
        let draft = draft_for(session.current().as_ref());
        Self {
            gateway,
            session,
            draft,
            engine: None,
        }
    }

    pub fn voter(&self) -> Option<Voter> {
        self.session.current()
    }

    /// Validate and start a session. Switching voters closes the ranking.
    pub async fn login(&mut self, email: &str) -> Result<Voter, ValidationError> {
        let email = validate_email(email)?;

        if self.session.email().as_deref() != Some(email.as_str()) {
            self.close_ranking().await;
        }
        self.session.login(&email);
        self.draft = ApartmentDraft::with_defaults();
        log_info!("Logged in as {email}");

        Ok(Voter {
            email,
            apartment: None,
        })
    }

    pub fn draft(&self) -> &ApartmentDraft {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut ApartmentDraft {
        &mut self.draft
    }

    /// Submit the draft, then move on to the ranking whether or not the
    /// write landed.
    pub async fn save(&mut self) -> Result<SubmitOutcome> {
        let outcome = self
            .draft
            .submit(&self.session, self.gateway.as_ref())
            .await?;

        if let Err(err) = self.open_ranking().await {
            log_warn!("Ranking not opened after save: {err:#}");
        }
        Ok(outcome)
    }

    /// Start a fresh engine for the current voter, subscribe it to pushes
    /// and load it. A previously open ranking is torn down first.
    ///
    /// The subscription is in place before the first read, so a change
    /// committed while loading still arrives as a push.
    pub async fn open_ranking(&mut self) -> Result<()> {
        let email = self.session.email().ok_or(ValidationError::NotLoggedIn)?;
        self.close_ranking().await;

        let engine = VoteEngine::new(self.gateway.clone());
        engine.start_push().await;
        if let Err(err) = engine.load(&email).await {
            engine.shutdown().await;
            return Err(err);
        }
        self.engine = Some(engine);
        Ok(())
    }

    pub fn is_ranking_open(&self) -> bool {
        self.engine.is_some()
    }

    pub fn events(&self) -> Option<broadcast::Receiver<EngineEvent>> {
        self.engine.as_ref().map(|engine| engine.events())
    }

    pub async fn toggle_vote(&self, owner: &str) -> Result<ToggleOutcome> {
        Ok(self.open_engine()?.toggle_vote(owner).await)
    }

    pub async fn refresh(&self) -> Result<()> {
        self.open_engine()?.refresh().await
    }

    pub async fn ranking(&self) -> Result<Vec<RankedApartment>> {
        Ok(self.open_engine()?.ranking().await)
    }

    pub async fn snapshot(&self) -> Result<VoteSnapshot> {
        Ok(self.open_engine()?.snapshot().await)
    }

    pub async fn logout(&mut self) {
        self.close_ranking().await;
        self.session.logout();
        self.draft = ApartmentDraft::with_defaults();
    }

    /// End of session: stop listening and drop the session slot.
    pub async fn shutdown(&mut self) {
        self.close_ranking().await;
        self.session.logout();
        log_info!("Session ended");
    }

    async fn close_ranking(&mut self) {
        if let Some(engine) = self.engine.take() {
            engine.shutdown().await;
        }
    }

    fn open_engine(&self) -> Result<&VoteEngine<G>> {
        if self.session.email().is_none() {
            return Err(ValidationError::NotLoggedIn.into());
        }
        self.engine
            .as_ref()
            .context("The ranking is not open yet; run `rank` first.")
    }
}

fn draft_for(voter: Option<&Voter>) -> ApartmentDraft {
    voter
        .and_then(|voter| voter.apartment.as_ref())
        .map(ApartmentDraft::from_choice)
        .unwrap_or_else(ApartmentDraft::with_defaults)
}
