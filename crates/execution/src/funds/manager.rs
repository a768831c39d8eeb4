//! Per-agent funds cache, limit policy and ledger.

use crate::ports::{PositionReader, WalletReader};
use chrono::{DateTime, Duration as ChronoDuration, Local, Utc};
use cruise_domain::error::Result;
use cruise_domain::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};

/// Configuration for the funds manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FundsSettings {
    /// How long a cached status is served before refreshing, in seconds.
    pub cache_ttl_secs: u64,
    /// Largest single transaction as a share of total value.
    pub max_single_tx_ratio: Decimal,
    /// Largest daily volume as a share of total value.
    pub max_daily_ratio: Decimal,
    /// Ledger entries kept per agent.
    pub ledger_capacity: usize,
}

impl Default for FundsSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,                    // 5 minutes
            max_single_tx_ratio: Decimal::new(30, 2), // 30%
            max_daily_ratio: Decimal::new(70, 2),     // 70%
            ledger_capacity: 1000,
        }
    }
}

/// Raised whenever an agent's available balance falls below its
/// emergency reserve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundsSafetyAlert {
    /// Agent whose balance is low.
    pub agent_id: String,
    /// Available balance after the write.
    pub available_balance: Decimal,
    /// Configured reserve.
    pub emergency_reserve: Decimal,
    /// When the alert was raised.
    pub at: DateTime<Utc>,
}

/// Bookkeeping for one agent.
struct AgentFunds {
    wallet_id: String,
    min_balance: Decimal,
    max_positions: usize,
    emergency_reserve: Decimal,
    initial_investment: Decimal,
    cached: Option<FundsStatus>,
    ledger: VecDeque<TransactionRecord>,
}

impl AgentFunds {
    fn daily_volume(&self, today: chrono::NaiveDate) -> Decimal {
        self.ledger
            .iter()
            .filter(|r| r.flow.counts_toward_volume())
            .filter(|r| r.timestamp.with_timezone(&Local).date_naive() == today)
            .map(|r| r.amount)
            .sum()
    }

    fn fees_since(&self, since: DateTime<Utc>) -> Decimal {
        self.ledger
            .iter()
            .filter(|r| r.flow == FundsFlow::Fee && r.timestamp >= since)
            .map(|r| r.amount)
            .sum()
    }
}

/// Cache of balances and positions plus the transaction limit policy.
pub struct FundsManager {
    /// Balance source.
    wallet: Arc<dyn WalletReader>,
    /// Position source.
    positions: Arc<dyn PositionReader>,
    /// Configuration.
    settings: FundsSettings,
    /// Bookkeeping by agent id.
    agents: RwLock<HashMap<String, AgentFunds>>,
    /// Safety alert fan-out.
    safety_tx: broadcast::Sender<FundsSafetyAlert>,
}

impl FundsManager {
    /// Creates a new funds manager.
    pub fn new(
        wallet: Arc<dyn WalletReader>,
        positions: Arc<dyn PositionReader>,
        settings: FundsSettings,
    ) -> Self {
        let (safety_tx, _) = broadcast::channel(64);
        Self {
            wallet,
            positions,
            settings,
            agents: RwLock::new(HashMap::new()),
            safety_tx,
        }
    }

    /// Subscribes to funds safety alerts.
    pub fn subscribe_safety(&self) -> broadcast::Receiver<FundsSafetyAlert> {
        self.safety_tx.subscribe()
    }

    /// Starts bookkeeping for an agent, optionally seeding the cache with a
    /// previously persisted status.
    pub async fn register_agent(
        &self,
        agent_id: &str,
        config: &AgentConfig,
        seed: Option<FundsStatus>,
    ) {
        let funds = AgentFunds {
            wallet_id: config.wallet_id.clone(),
            min_balance: config.min_balance,
            max_positions: config.max_positions,
            emergency_reserve: config.emergency_reserve,
            initial_investment: config.initial_investment,
            cached: seed,
            ledger: VecDeque::new(),
        };
        self.agents.write().await.insert(agent_id.to_string(), funds);
        debug!(agent_id = agent_id, "Funds bookkeeping registered");
    }

    /// Drops an agent's bookkeeping. Returns `false` if it was unknown.
    pub async fn unregister_agent(&self, agent_id: &str) -> bool {
        self.agents.write().await.remove(agent_id).is_some()
    }

    /// Returns the cached status if it is fresh, refreshing otherwise.
    pub async fn get_funds_status(&self, agent_id: &str) -> Result<FundsStatus> {
        let ttl = ChronoDuration::seconds(self.settings.cache_ttl_secs as i64);
        {
            let agents = self.agents.read().await;
            let funds = agents
                .get(agent_id)
                .ok_or_else(|| CruiseError::AgentNotRegistered(agent_id.to_string()))?;
            if let Some(cached) = &funds.cached
                && Utc::now() - cached.last_update() < ttl
            {
                return Ok(cached.clone());
            }
        }
        self.refresh(agent_id).await
    }

    /// Reads balance and positions from the chain and replaces the cache.
    pub async fn refresh(&self, agent_id: &str) -> Result<FundsStatus> {
        let wallet_id = self.wallet_of(agent_id).await?;

        let balance = self
            .wallet
            .balance(&wallet_id)
            .await
            .map_err(CruiseError::chain)?;
        let positions = self
            .positions
            .positions(&wallet_id)
            .await
            .map_err(CruiseError::chain)?;

        let status = FundsStatus::new(balance, positions);
        debug!(
            agent_id = agent_id,
            total = %status.total_value(),
            available = %status.available_balance(),
            positions = status.positions().len(),
            "Funds refreshed"
        );
        self.store(agent_id, status.clone()).await?;
        Ok(status)
    }

    /// Drops the cached status so the next read goes to the chain.
    pub async fn invalidate(&self, agent_id: &str) {
        if let Some(funds) = self.agents.write().await.get_mut(agent_id) {
            funds.cached = None;
        }
    }

    /// Writes a known status for an agent.
    pub async fn update_funds(
        &self,
        agent_id: &str,
        available_balance: Decimal,
        positions: Vec<PositionValue>,
    ) -> Result<FundsStatus> {
        let status = FundsStatus::new(available_balance, positions);
        self.store(agent_id, status.clone()).await?;
        Ok(status)
    }

    async fn store(&self, agent_id: &str, status: FundsStatus) -> Result<()> {
        let alert = {
            let mut agents = self.agents.write().await;
            let funds = agents
                .get_mut(agent_id)
                .ok_or_else(|| CruiseError::AgentNotRegistered(agent_id.to_string()))?;
            let alert = (status.available_balance() < funds.emergency_reserve).then(|| {
                FundsSafetyAlert {
                    agent_id: agent_id.to_string(),
                    available_balance: status.available_balance(),
                    emergency_reserve: funds.emergency_reserve,
                    at: Utc::now(),
                }
            });
            funds.cached = Some(status);
            alert
        };

        if let Some(alert) = alert {
            warn!(
                agent_id = agent_id,
                available = %alert.available_balance,
                reserve = %alert.emergency_reserve,
                "Available balance below emergency reserve"
            );
            // No subscribers is fine.
            let _ = self.safety_tx.send(alert);
        }
        Ok(())
    }

    async fn wallet_of(&self, agent_id: &str) -> Result<String> {
        self.agents
            .read()
            .await
            .get(agent_id)
            .map(|f| f.wallet_id.clone())
            .ok_or_else(|| CruiseError::AgentNotRegistered(agent_id.to_string()))
    }

    /// Returns `true` when a transaction of `amount` may go ahead.
    ///
    /// Denies instead of failing: unknown agents and unreadable funds are
    /// denied too.
    pub async fn check_transaction_limit(
        &self,
        agent_id: &str,
        amount: Decimal,
        flow: FundsFlow,
    ) -> bool {
        let status = match self.get_funds_status(agent_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(agent_id = agent_id, error = %e, "Denying transaction, funds unavailable");
                return false;
            }
        };

        let agents = self.agents.read().await;
        let Some(funds) = agents.get(agent_id) else {
            return false;
        };

        let total = status.total_value();
        let deny = |reason: &str| {
            info!(
                agent_id = agent_id,
                amount = %amount,
                flow = ?flow,
                reason = reason,
                "Transaction limit denied"
            );
            false
        };

        if amount > total * self.settings.max_single_tx_ratio {
            return deny("exceeds single transaction cap");
        }

        if flow.counts_toward_volume() {
            let today = Local::now().date_naive();
            let volume = funds.daily_volume(today);
            if volume + amount > total * self.settings.max_daily_ratio {
                return deny("exceeds daily volume cap");
            }
        }

        if flow.is_outflow() && status.available_balance() - amount < funds.min_balance {
            return deny("would drop below minimum balance");
        }

        if flow == FundsFlow::AddLiquidity && status.positions().len() >= funds.max_positions {
            return deny("position limit reached");
        }

        true
    }

    /// Appends a ledger entry, evicting the oldest beyond capacity.
    pub async fn record_transaction(
        &self,
        agent_id: &str,
        amount: Decimal,
        flow: FundsFlow,
    ) -> Result<()> {
        let mut agents = self.agents.write().await;
        let funds = agents
            .get_mut(agent_id)
            .ok_or_else(|| CruiseError::AgentNotRegistered(agent_id.to_string()))?;

        funds.ledger.push_back(TransactionRecord {
            timestamp: Utc::now(),
            amount,
            flow,
        });
        while funds.ledger.len() > self.settings.ledger_capacity {
            funds.ledger.pop_front();
        }
        Ok(())
    }

    /// Ledger entries for an agent, oldest first.
    pub async fn ledger(&self, agent_id: &str) -> Vec<TransactionRecord> {
        self.agents
            .read()
            .await
            .get(agent_id)
            .map(|f| f.ledger.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Total return against the initial investment and fee yield over the
    /// last day, week and month.
    pub async fn calculate_returns(&self, agent_id: &str) -> Result<Returns> {
        let status = self.get_funds_status(agent_id).await?;
        let agents = self.agents.read().await;
        let funds = agents
            .get(agent_id)
            .ok_or_else(|| CruiseError::AgentNotRegistered(agent_id.to_string()))?;

        let current = status.total_value();
        let ratio = |numerator: Decimal, denominator: Decimal| {
            if denominator.is_zero() {
                Decimal::ZERO
            } else {
                numerator / denominator
            }
        };

        let now = Utc::now();
        Ok(Returns {
            total: ratio(current - funds.initial_investment, funds.initial_investment),
            daily: ratio(funds.fees_since(now - ChronoDuration::days(1)), current),
            weekly: ratio(funds.fees_since(now - ChronoDuration::weeks(1)), current),
            monthly: ratio(funds.fees_since(now - ChronoDuration::days(30)), current),
        })
    }
}
