//! Randomness-oracle seam and the sr25519 VRF reference oracle.
//!
//! The engine only talks to the trait. `VrfRandomizer` plays the part of a
//! production randomness service: it assigns request ids, deduplicates
//! nonces per client, keeps per-client gas-funding balances, and evaluates
//! a VRF whose output anyone can verify against the published proof. The
//! fulfilled value still has to be pushed into the engine by the oracle
//! principal through the randomness callback.

use crate::table::types::{AccountId, Amount, Entropy, RequestId};
use crate::token::{StakingAsset, TokenError};
use dashmap::DashMap;
use schnorrkel::vrf::{VRFPreOut, VRFProof};
use schnorrkel::{ExpansionMode, Keypair, MiniSecretKey, PublicKey};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

const SPIN_SIGNING_CONTEXT: &[u8] = b"roulette-spin";
const SPIN_OUTPUT_CONTEXT: &[u8] = b"roulette-spin-output";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("nonce {nonce} was already used by client {client}")]
    DuplicateNonce { client: AccountId, nonce: u64 },
    #[error("unknown randomness request {0}")]
    UnknownRequest(RequestId),
    #[error("insufficient oracle deposit: need {need}, have {have}")]
    InsufficientDeposit { need: Amount, have: Amount },
    #[error("deposit accounting overflowed")]
    DepositOverflow,
    #[error("malformed spin proof: {0}")]
    MalformedProof(String),
    #[error("oracle payout failed: {0}")]
    Transfer(#[from] TokenError),
}

/// External randomness service, as the engine sees it.
pub trait RandomnessOracle: Send + Sync {
    /// Principal the oracle calls back from; the engine authorizes
    /// `deliver_random` against this account.
    fn account(&self) -> AccountId;

    /// Register a randomness request for `client`. The `nonce` is chosen by
    /// the client; reuse of a nonce by the same client is rejected.
    fn request_random(&self, client: AccountId, nonce: u64) -> Result<RequestId, OracleError>;

    /// Credit `amount` to the client's gas-funding balance. The asset itself
    /// has already been moved into the oracle's account by the caller.
    fn client_deposit(&self, client: AccountId, amount: Amount) -> Result<(), OracleError>;

    /// Debit the client's gas-funding balance; the oracle pays `to` directly.
    fn client_withdraw(
        &self,
        client: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), OracleError>;

    fn fund_balance(&self, client: AccountId) -> Amount;
}

/// Published alongside a fulfilled spin so anyone can check the outcome.
///
/// `vrf_output` is the 32-byte entropy, `vrf_preout` the VRF output point
/// it is drawn from, `vrf_proof` the DLEQ proof binding that point to
/// `public_key` and `input_message`. All hex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpinProof {
    pub request_id: RequestId,
    pub vrf_output: String,
    pub vrf_preout: String,
    pub vrf_proof: String,
    pub public_key: String,
    pub input_message: String,
}

#[derive(Debug, Clone)]
struct RandomnessRequest {
    client: AccountId,
    nonce: u64,
}

/// Deterministic-per-key VRF oracle.
///
/// The oracle's principal is its sr25519 public key. Fulfillment evaluates
/// the VRF over the request context; the output point is fixed by the key
/// and the input, so fulfilling the same request twice yields identical
/// entropy, while each fulfillment publishes a fresh proof of that same
/// output.
pub struct VrfRandomizer {
    keypair: Arc<Keypair>,
    account: AccountId,
    asset: Arc<dyn StakingAsset>,
    request_fee: Amount,
    next_request: AtomicU64,
    requests: DashMap<RequestId, RandomnessRequest>,
    seen_nonces: DashMap<(AccountId, u64), RequestId>,
    fund_balances: DashMap<AccountId, Amount>,
}

impl VrfRandomizer {
    pub fn new(keypair: Keypair, asset: Arc<dyn StakingAsset>, request_fee: Amount) -> Self {
        let account = AccountId::new(keypair.public.to_bytes());
        Self {
            keypair: Arc::new(keypair),
            account,
            asset,
            request_fee,
            next_request: AtomicU64::new(1),
            requests: DashMap::new(),
            seen_nonces: DashMap::new(),
            fund_balances: DashMap::new(),
        }
    }

    /// Fresh random keypair.
    pub fn new_random(asset: Arc<dyn StakingAsset>, request_fee: Amount) -> Self {
        use rand_core::OsRng;
        Self::new(Keypair::generate_with(OsRng), asset, request_fee)
    }

    /// Deterministic keypair from a 32-byte seed, for reproducible runs.
    pub fn from_seed(seed: [u8; 32], asset: Arc<dyn StakingAsset>, request_fee: Amount) -> Self {
        let mini = MiniSecretKey::from_bytes(&seed).expect("a 32-byte seed is always valid");
        Self::new(mini.expand_to_keypair(ExpansionMode::Ed25519), asset, request_fee)
    }

    /// The message a fulfillment signs for a given request.
    pub fn expected_input(client: AccountId, request_id: RequestId, nonce: u64) -> String {
        format!("{}:{}:{}", client.to_hex(), request_id, nonce)
    }

    /// Evaluate the VRF for a registered request.
    ///
    /// Returns the 32-byte entropy plus the proof to publish. The request
    /// stays registered, so fulfillment can be repeated after a crash and
    /// will return the identical value.
    pub fn fulfill(&self, request_id: RequestId) -> Result<(Entropy, SpinProof), OracleError> {
        let request = self
            .requests
            .get(&request_id)
            .ok_or(OracleError::UnknownRequest(request_id))?;
        let input_message = Self::expected_input(request.client, request_id, request.nonce);

        let (entropy, preout_bytes, proof_bytes) = self.vrf_sign(input_message.as_bytes());
        let proof = SpinProof {
            request_id,
            vrf_output: hex::encode(entropy),
            vrf_preout: hex::encode(preout_bytes),
            vrf_proof: hex::encode(proof_bytes),
            public_key: self.account.to_hex(),
            input_message,
        };
        Ok((entropy, proof))
    }

    fn vrf_sign(&self, message: &[u8]) -> (Entropy, [u8; 32], [u8; 64]) {
        use schnorrkel::context::SigningContext;

        let ctx = SigningContext::new(SPIN_SIGNING_CONTEXT);
        let (inout, proof, _) = self.keypair.vrf_sign(ctx.bytes(message));

        // The output point is fixed by (key, input); only the DLEQ proof
        // carries fresh randomness, so repeated fulfillments agree on the
        // entropy while each proof still verifies.
        let entropy: Entropy = inout.make_bytes(SPIN_OUTPUT_CONTEXT);
        (entropy, inout.to_preout().to_bytes(), proof.to_bytes())
    }

    /// Check a published proof against the input the verifier expects.
    pub fn verify(proof: &SpinProof, expected_input: &str) -> Result<bool, OracleError> {
        use schnorrkel::context::SigningContext;

        if proof.input_message != expected_input {
            return Ok(false);
        }

        let vrf_output = hex::decode(&proof.vrf_output)
            .map_err(|e| OracleError::MalformedProof(format!("bad output hex: {}", e)))?;
        let preout_bytes = hex::decode(&proof.vrf_preout)
            .map_err(|e| OracleError::MalformedProof(format!("bad pre-output hex: {}", e)))?;
        let proof_bytes = hex::decode(&proof.vrf_proof)
            .map_err(|e| OracleError::MalformedProof(format!("bad proof hex: {}", e)))?;
        let key_bytes = hex::decode(&proof.public_key)
            .map_err(|e| OracleError::MalformedProof(format!("bad public key hex: {}", e)))?;

        let public_key = PublicKey::from_bytes(&key_bytes)
            .map_err(|e| OracleError::MalformedProof(format!("bad public key: {:?}", e)))?;
        let preout = VRFPreOut::from_bytes(&preout_bytes)
            .map_err(|e| OracleError::MalformedProof(format!("bad pre-output: {:?}", e)))?;
        let dleq = VRFProof::from_bytes(&proof_bytes)
            .map_err(|e| OracleError::MalformedProof(format!("bad proof: {:?}", e)))?;

        let ctx = SigningContext::new(SPIN_SIGNING_CONTEXT);
        let transcript = ctx.bytes(expected_input.as_bytes());
        let inout = match public_key.vrf_verify(transcript, &preout, &dleq) {
            Ok((inout, _)) => inout,
            Err(_) => return Ok(false),
        };

        // The proof only vouches for the output point; the published
        // entropy must match the bytes drawn from it.
        let derived: Entropy = inout.make_bytes(SPIN_OUTPUT_CONTEXT);
        Ok(derived.as_slice() == vrf_output.as_slice())
    }

    fn debit_fee(&self, client: AccountId) -> Result<(), OracleError> {
        let mut balance = self.fund_balances.entry(client).or_insert(0);
        if *balance < self.request_fee {
            return Err(OracleError::InsufficientDeposit {
                need: self.request_fee,
                have: *balance,
            });
        }
        *balance -= self.request_fee;
        Ok(())
    }
}

impl RandomnessOracle for VrfRandomizer {
    fn account(&self) -> AccountId {
        self.account
    }

    fn request_random(&self, client: AccountId, nonce: u64) -> Result<RequestId, OracleError> {
        use dashmap::mapref::entry::Entry;

        // Reserve the nonce through the entry so two racing calls with the
        // same (client, nonce) cannot both pass the dedup check. Request
        // ids start at 1; 0 marks a reservation in flight.
        let nonce_key = (client, nonce);
        match self.seen_nonces.entry(nonce_key) {
            Entry::Occupied(_) => return Err(OracleError::DuplicateNonce { client, nonce }),
            Entry::Vacant(slot) => {
                slot.insert(0);
            }
        }

        if self.request_fee > 0 {
            if let Err(err) = self.debit_fee(client) {
                // A rejected request must not burn the nonce.
                self.seen_nonces.remove(&nonce_key);
                return Err(err);
            }
        }

        let id = self.next_request.fetch_add(1, Ordering::SeqCst);
        self.requests.insert(id, RandomnessRequest { client, nonce });
        self.seen_nonces.insert(nonce_key, id);
        Ok(id)
    }

    fn client_deposit(&self, client: AccountId, amount: Amount) -> Result<(), OracleError> {
        let mut balance = self.fund_balances.entry(client).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(OracleError::DepositOverflow)?;
        Ok(())
    }

    fn client_withdraw(
        &self,
        client: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<(), OracleError> {
        let mut balance = self.fund_balances.entry(client).or_insert(0);
        if *balance < amount {
            return Err(OracleError::InsufficientDeposit {
                need: amount,
                have: *balance,
            });
        }
        self.asset.transfer(self.account, to, amount)?;
        *balance -= amount;
        Ok(())
    }

    fn fund_balance(&self, client: AccountId) -> Amount {
        self.fund_balances
            .get(&client)
            .map(|balance| *balance)
            .unwrap_or(0)
    }
}
