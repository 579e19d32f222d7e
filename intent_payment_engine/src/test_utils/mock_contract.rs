use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration, Utc};
use ipg_common::{ChainAddress, TokenAmount};

use crate::traits::{ChainError, ContractIntentState, ContractReader, IntentLimits, PaymentContract};

/// Construction parameters for one scripted escrow. Defaults: caps 1000/100, nothing spent, a window from an hour
/// ago to a day ahead, zero escrow balance, active, unrestricted merchants.
#[derive(Debug, Clone)]
pub struct ContractIntentConfig {
    pub address: ChainAddress,
    pub payer: ChainAddress,
    pub agent: ChainAddress,
    pub token: ChainAddress,
    pub total_cap: TokenAmount,
    pub per_tx_cap: TokenAmount,
    pub spent: TokenAmount,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub balance: TokenAmount,
    pub metadata_uri: Option<String>,
    /// `None` means unrestricted (any merchant).
    pub merchants: Option<Vec<(ChainAddress, bool)>>,
    pub state: ContractIntentState,
}

impl ContractIntentConfig {
    pub fn new(address: ChainAddress, payer: ChainAddress, agent: ChainAddress, token: ChainAddress) -> Self {
        let now = Utc::now();
        Self {
            address,
            payer,
            agent,
            token,
            total_cap: TokenAmount::from(1000),
            per_tx_cap: TokenAmount::from(100),
            spent: TokenAmount::from(0),
            start: now - Duration::hours(1),
            end: now + Duration::hours(24),
            balance: TokenAmount::from(0),
            metadata_uri: None,
            merchants: None,
            state: ContractIntentState::Active,
        }
    }

    pub fn with_caps(mut self, total: i64, per_tx: i64) -> Self {
        self.total_cap = TokenAmount::from(total);
        self.per_tx_cap = TokenAmount::from(per_tx);
        self
    }

    pub fn with_spent(mut self, spent: i64) -> Self {
        self.spent = TokenAmount::from(spent);
        self
    }

    pub fn with_balance(mut self, balance: i64) -> Self {
        self.balance = TokenAmount::from(balance);
        self
    }

    pub fn with_merchants(mut self, merchants: Vec<(ChainAddress, bool)>) -> Self {
        self.merchants = Some(merchants);
        self
    }
}

struct IntentState {
    config: ContractIntentConfig,
}

#[derive(Default)]
struct ContractsInner {
    intents: HashMap<ChainAddress, IntentState>,
    token_balances: HashMap<(ChainAddress, ChainAddress), TokenAmount>,
    forced_execute_reverts: VecDeque<String>,
    tx_counter: u64,
}

impl ContractsInner {
    fn next_txid(&mut self, tag: &str) -> String {
        self.tx_counter += 1;
        format!("0x{tag}{:08x}", self.tx_counter)
    }
}

/// A scripted escrow-and-token world implementing both contract traits. The execute path enforces the same rules
/// as the real contract (state, window, merchant, caps, balance) and reverts with realistic reason strings, so the
/// orchestrator's classification logic gets exercised for real.
#[derive(Clone)]
pub struct MemoryContracts {
    /// The identity transactions are signed as; `transfer` spends this holder's token balance.
    caller: ChainAddress,
    inner: Arc<Mutex<ContractsInner>>,
}

impl MemoryContracts {
    pub fn new(caller: ChainAddress) -> Self {
        Self { caller, inner: Arc::new(Mutex::new(ContractsInner::default())) }
    }

    pub fn add_intent(&self, config: ContractIntentConfig) {
        let mut inner = self.inner.lock().unwrap();
        inner.intents.insert(config.address.clone(), IntentState { config });
    }

    pub fn set_token_balance(&self, token: &ChainAddress, holder: &ChainAddress, amount: TokenAmount) {
        let mut inner = self.inner.lock().unwrap();
        inner.token_balances.insert((token.clone(), holder.clone()), amount);
    }

    /// Forces the next `execute` call to revert with the given reason, regardless of the intent's actual state.
    pub fn queue_execute_revert(&self, reason: &str) {
        self.inner.lock().unwrap().forced_execute_reverts.push_back(reason.to_string());
    }

    pub fn set_spent(&self, intent: &ChainAddress, spent: TokenAmount) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(state) = inner.intents.get_mut(intent) {
            state.config.spent = spent;
        }
    }

    pub fn set_state(&self, intent: &ChainAddress, state: ContractIntentState) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(s) = inner.intents.get_mut(intent) {
            s.config.state = state;
        }
    }

    pub fn escrow_balance_of(&self, intent: &ChainAddress) -> TokenAmount {
        self.inner.lock().unwrap().intents.get(intent).map(|s| s.config.balance).unwrap_or_default()
    }

    pub fn spent_of(&self, intent: &ChainAddress) -> TokenAmount {
        self.inner.lock().unwrap().intents.get(intent).map(|s| s.config.spent).unwrap_or_default()
    }

    pub fn token_balance_of(&self, token: &ChainAddress, holder: &ChainAddress) -> TokenAmount {
        self.inner.lock().unwrap().token_balances.get(&(token.clone(), holder.clone())).copied().unwrap_or_default()
    }

    fn unknown(intent: &ChainAddress) -> ChainError {
        ChainError::Rpc(format!("no contract deployed at {intent}"))
    }
}

impl ContractReader for MemoryContracts {
    async fn limits(&self, intent: &ChainAddress) -> Result<IntentLimits, ChainError> {
        let inner = self.inner.lock().unwrap();
        let state = inner.intents.get(intent).ok_or_else(|| Self::unknown(intent))?;
        let c = &state.config;
        Ok(IntentLimits {
            total_cap: c.total_cap,
            per_tx_cap: c.per_tx_cap,
            spent: c.spent,
            start: c.start,
            end: c.end,
        })
    }

    async fn state(&self, intent: &ChainAddress) -> Result<ContractIntentState, ChainError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.intents.get(intent).ok_or_else(|| Self::unknown(intent))?.config.state)
    }

    async fn get_balance(&self, intent: &ChainAddress) -> Result<TokenAmount, ChainError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.intents.get(intent).ok_or_else(|| Self::unknown(intent))?.config.balance)
    }

    async fn is_merchant_allowed(&self, intent: &ChainAddress, merchant: &ChainAddress) -> Result<bool, ChainError> {
        let inner = self.inner.lock().unwrap();
        let config = &inner.intents.get(intent).ok_or_else(|| Self::unknown(intent))?.config;
        Ok(match &config.merchants {
            None => true,
            Some(list) => list.iter().any(|(m, allowed)| m == merchant && *allowed),
        })
    }

    async fn token_address(&self, intent: &ChainAddress) -> Result<ChainAddress, ChainError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.intents.get(intent).ok_or_else(|| Self::unknown(intent))?.config.token.clone())
    }

    async fn metadata_uri(&self, intent: &ChainAddress) -> Result<Option<String>, ChainError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.intents.get(intent).ok_or_else(|| Self::unknown(intent))?.config.metadata_uri.clone())
    }

    async fn allowed_merchants(&self, intent: &ChainAddress) -> Result<Vec<ChainAddress>, ChainError> {
        let inner = self.inner.lock().unwrap();
        let config = &inner.intents.get(intent).ok_or_else(|| Self::unknown(intent))?.config;
        Ok(config
            .merchants
            .as_ref()
            .map(|list| list.iter().filter(|(_, allowed)| *allowed).map(|(m, _)| m.clone()).collect())
            .unwrap_or_default())
    }

    async fn token_balance(&self, token: &ChainAddress, holder: &ChainAddress) -> Result<TokenAmount, ChainError> {
        Ok(self.token_balance_of(token, holder))
    }

    async fn payer_intents(&self, payer: &ChainAddress) -> Result<Vec<ChainAddress>, ChainError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.intents.values().filter(|s| s.config.payer == *payer).map(|s| s.config.address.clone()).collect())
    }

    async fn agent_intents(&self, agent: &ChainAddress) -> Result<Vec<ChainAddress>, ChainError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.intents.values().filter(|s| s.config.agent == *agent).map(|s| s.config.address.clone()).collect())
    }
}

impl PaymentContract for MemoryContracts {
    async fn execute(
        &self,
        intent: &ChainAddress,
        merchant: &ChainAddress,
        amount: TokenAmount,
        _receipt_hash: &str,
        _receipt_uri: &str,
    ) -> Result<String, ChainError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(reason) = inner.forced_execute_reverts.pop_front() {
            return Err(ChainError::Reverted { reason });
        }
        let now = Utc::now();
        let state = inner.intents.get(intent).ok_or_else(|| Self::unknown(intent))?;
        let c = &state.config;
        if !matches!(c.state, ContractIntentState::Active) {
            return Err(ChainError::Reverted { reason: "PaymentIntent: not active".to_string() });
        }
        if now < c.start {
            return Err(ChainError::Reverted { reason: "PaymentIntent: not started".to_string() });
        }
        if now >= c.end {
            return Err(ChainError::Reverted { reason: "PaymentIntent: intent expired".to_string() });
        }
        let merchant_ok = match &c.merchants {
            None => true,
            Some(list) => list.iter().any(|(m, allowed)| m == merchant && *allowed),
        };
        if !merchant_ok {
            return Err(ChainError::Reverted { reason: "PaymentIntent: merchant not allowed".to_string() });
        }
        if amount > c.per_tx_cap {
            return Err(ChainError::Reverted {
                reason: "PaymentIntent: amount exceeds per-transaction cap".to_string(),
            });
        }
        if c.spent + amount > c.total_cap {
            return Err(ChainError::Reverted { reason: "PaymentIntent: total cap exceeded".to_string() });
        }
        if c.balance < amount {
            return Err(ChainError::Reverted { reason: "PaymentIntent: insufficient balance".to_string() });
        }
        let token = c.token.clone();
        let merchant = merchant.clone();
        let state = inner.intents.get_mut(intent).unwrap();
        state.config.balance = state.config.balance - amount;
        state.config.spent = state.config.spent + amount;
        let entry = inner.token_balances.entry((token, merchant)).or_default();
        *entry = *entry + amount;
        Ok(inner.next_txid("exec"))
    }

    async fn top_up(&self, intent: &ChainAddress, amount: TokenAmount) -> Result<String, ChainError> {
        let token = {
            let inner = self.inner.lock().unwrap();
            inner.intents.get(intent).ok_or_else(|| Self::unknown(intent))?.config.token.clone()
        };
        self.transfer(&token, intent, amount).await
    }

    async fn revoke(&self, intent: &ChainAddress, _reason: &str) -> Result<String, ChainError> {
        let mut inner = self.inner.lock().unwrap();
        let state = inner.intents.get_mut(intent).ok_or_else(|| Self::unknown(intent))?;
        state.config.state = ContractIntentState::Revoked;
        Ok(inner.next_txid("revoke"))
    }

    async fn transfer(
        &self,
        token: &ChainAddress,
        to: &ChainAddress,
        amount: TokenAmount,
    ) -> Result<String, ChainError> {
        let mut inner = self.inner.lock().unwrap();
        let key = (token.clone(), self.caller.clone());
        let available = inner.token_balances.get(&key).copied().unwrap_or_default();
        if available < amount {
            return Err(ChainError::Reverted { reason: "ERC20: transfer amount exceeds balance".to_string() });
        }
        inner.token_balances.insert(key, available - amount);
        // Transfers into an escrow raise its spendable balance; anything else is a plain wallet credit.
        if let Some(state) = inner.intents.get_mut(to) {
            if state.config.token == *token {
                state.config.balance = state.config.balance + amount;
            }
        } else {
            let entry = inner.token_balances.entry((token.clone(), to.clone())).or_default();
            *entry = *entry + amount;
        }
        Ok(inner.next_txid("fund"))
    }

    async fn approve(
        &self,
        _token: &ChainAddress,
        _spender: &ChainAddress,
        _amount: TokenAmount,
    ) -> Result<String, ChainError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.next_txid("approve"))
    }
}
