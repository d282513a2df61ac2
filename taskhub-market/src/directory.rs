//! Agent directory: registration, authentication and reputation.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use taskhub_core::constants::{API_KEY_BYTES, API_KEY_PREFIX, INITIAL_POINTS};
use taskhub_core::{
    hash_api_key, normalize_agent_name, Agent, AgentId, AgentProfile, EntityType, MarketError,
    MarketResult, Timestamp, ValidationError,
};
use taskhub_storage::MarketTx;

use crate::{finish, ledger, Market};

/// Registration input.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgent {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A new agent and the only copy of their API key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub agent: AgentProfile,
    pub api_key: String,
}

fn generate_api_key() -> String {
    let mut bytes = [0u8; API_KEY_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    format!("{}{}", API_KEY_PREFIX, hex::encode(bytes))
}

impl Market {
    /// Register an agent and credit the registration bonus.
    pub async fn register_agent(&self, input: RegisterAgent) -> MarketResult<Registration> {
        let name = normalize_agent_name(input.name.as_deref())?;
        let description = input
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        let api_key = generate_api_key();
        let now = self.now();

        let mut tx = self.store.begin().await?;
        let outcome = register_in(tx.as_mut(), name, description, &api_key, now).await;
        let agent = finish(tx, outcome).await?;

        tracing::info!(agent_id = %agent.id, name = %agent.name, "Agent registered");
        Ok(Registration {
            agent: AgentProfile::from(&agent),
            api_key,
        })
    }

    /// Resolve a bearer token to its agent.
    pub async fn authenticate(&self, token: Option<&str>) -> MarketResult<Agent> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| MarketError::unauthenticated("missing API key"))?;
        let agent = self
            .store
            .agent_by_key_hash(&hash_api_key(token))
            .await?
            .ok_or_else(|| MarketError::unauthenticated("invalid API key"))?;
        if agent.is_suspended() {
            return Err(MarketError::forbidden(format!(
                "agent {} is suspended",
                agent.id
            )));
        }
        Ok(agent)
    }

    pub async fn agent_profile(&self, agent_id: AgentId) -> MarketResult<AgentProfile> {
        let agent = self
            .store
            .agent_get(agent_id)
            .await?
            .ok_or(MarketError::not_found(EntityType::Agent, agent_id))?;
        Ok(AgentProfile::from(&agent))
    }
}

async fn register_in(
    tx: &mut dyn MarketTx,
    name: String,
    description: Option<String>,
    api_key: &str,
    now: Timestamp,
) -> MarketResult<Agent> {
    if tx.agent_name_taken(&name).await? {
        return Err(ValidationError::ConstraintViolation {
            constraint: "agent_name_unique".to_string(),
            reason: format!("name '{}' is already registered", name),
        }
        .into());
    }
    let agent = Agent::new(name, description, hash_api_key(api_key), now);
    tx.agent_insert(&agent).await?;
    ledger::record_init(tx, agent.id, INITIAL_POINTS, now).await
}

// ============================================================================
// REPUTATION
// ============================================================================

/// Count a settled task for both participants.
pub(crate) async fn record_settlement(
    tx: &mut dyn MarketTx,
    creator_id: AgentId,
    executor_id: AgentId,
    now: Timestamp,
) -> MarketResult<()> {
    for agent_id in ordered(creator_id, executor_id) {
        let mut agent = tx
            .agent_for_update(agent_id)
            .await?
            .ok_or(MarketError::not_found(EntityType::Agent, agent_id))?;
        agent.record_success(now);
        tx.agent_update(&agent).await?;
    }
    Ok(())
}

/// Count a rejected task against the creator. The executor is left as is.
pub(crate) async fn record_rejection(
    tx: &mut dyn MarketTx,
    creator_id: AgentId,
    now: Timestamp,
) -> MarketResult<()> {
    let mut creator = tx
        .agent_for_update(creator_id)
        .await?
        .ok_or(MarketError::not_found(EntityType::Agent, creator_id))?;
    creator.record_rejection(now);
    tx.agent_update(&creator).await
}

fn ordered(a: AgentId, b: AgentId) -> [AgentId; 2] {
    if a <= b {
        [a, b]
    } else {
        [b, a]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_keys_are_unique_and_prefixed() {
        let a = generate_api_key();
        let b = generate_api_key();
        assert_ne!(a, b);
        assert!(a.starts_with(API_KEY_PREFIX));
        assert_eq!(a.len(), API_KEY_PREFIX.len() + API_KEY_BYTES * 2);
    }

    #[test]
    fn test_ordered() {
        let lo = uuid::Uuid::nil();
        let hi = uuid::Uuid::max();
        assert_eq!(ordered(hi, lo), [lo, hi]);
        assert_eq!(ordered(lo, hi), [lo, hi]);
    }
}
