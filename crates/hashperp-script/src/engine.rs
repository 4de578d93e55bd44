//! # Script Engine
//!
//! Stateless construction of every script and transaction HashPerp uses.
//! Everything here is a pure function of the contract terms, the VTXOs being
//! spent and the participants' keys; nothing is executed or broadcast.
//!
//! ## VTXO output
//!
//! Each VTXO is a script-path-only P2TR output (NUMS internal key) with
//! five leaves, always in this order:
//!
//! | index | leaf        | script |
//! |-------|-------------|--------|
//! | 0     | buyer path  | `IF <expiry> CLTV DROP SHA256 <outcome> EQUALVERIFY <buyer> CHECKSIG ELSE <csv> CSV DROP <seller> CHECKSIG ENDIF` |
//! | 1     | seller path | same, roles swapped |
//! | 2     | cooperative | `<buyer> CHECKSIGVERIFY <seller> CHECKSIG` |
//! | 3     | timeout     | `<csv> CSV DROP <owner> CHECKSIG` |
//! | 4     | sweep       | `<owner> CHECKSIG` |
//!
//! ## Settlement chain
//!
//! ```text
//! buyer VTXO ──┐                                                       ┌───────────────┐
//!              ├─▶ setup (coinflip, coop leaf) ─▶ final (buyer|seller|coop) ─▶ settlement │ winner │
//! seller VTXO ─┘                                                       └───────────────┘
//! ```

use bitcoin::opcodes::all::{
    OP_CHECKSIG, OP_CHECKSIGVERIFY, OP_CLTV, OP_CSV, OP_DROP, OP_ELSE, OP_ENDIF, OP_EQUALVERIFY,
    OP_IF, OP_SHA256,
};
use bitcoin::script::Builder;
use bitcoin::secp256k1::{Secp256k1, VerifyOnly};
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Witness, absolute};
use hashperp_types::{
    Contract, HashPerpError, Position, Result, ScriptPathKind, Vtxo, XOnlyKey,
};
use rust_decimal::Decimal;
use tracing::debug;

use crate::tagged::outcome_hash;
use crate::taproot::{NUMS_INTERNAL_KEY, TaprootOutput, key_path_script_pubkey, parse_key};
use crate::transaction::{btc_to_amount, height_lock_time, txid, unsigned, vtxo_outpoint};
use crate::witness::{self, PLACEHOLDER_SIGNATURE};

/// The current keys of both contract parties.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Participants {
    pub buyer: XOnlyKey,
    pub seller: XOnlyKey,
}

impl Participants {
    #[must_use]
    pub fn key(&self, position: Position) -> XOnlyKey {
        match position {
            Position::Buyer => self.buyer,
            Position::Seller => self.seller,
        }
    }
}

/// The three stages of a settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettlementStage {
    Setup,
    Final,
    Settlement,
}

impl SettlementStage {
    pub const ORDER: [Self; 3] = [Self::Setup, Self::Final, Self::Settlement];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Final => "final",
            Self::Settlement => "settlement",
        }
    }
}

impl std::fmt::Display for SettlementStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Setup, final and settlement transactions, each spending the previous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementChain {
    pub setup: Transaction,
    pub final_tx: Transaction,
    pub settlement: Transaction,
}

impl SettlementChain {
    #[must_use]
    pub fn stage(&self, stage: SettlementStage) -> &Transaction {
        match stage {
            SettlementStage::Setup => &self.setup,
            SettlementStage::Final => &self.final_tx,
            SettlementStage::Settlement => &self.settlement,
        }
    }
}

/// Builds scripts, Taproot outputs and transactions.
#[derive(Debug, Clone)]
pub struct ScriptEngine {
    secp: Secp256k1<VerifyOnly>,
    timeout_csv_blocks: u64,
}

impl ScriptEngine {
    #[must_use]
    pub fn new(timeout_csv_blocks: u64) -> Self {
        Self {
            secp: Secp256k1::verification_only(),
            timeout_csv_blocks,
        }
    }

    #[must_use]
    pub fn secp(&self) -> &Secp256k1<VerifyOnly> {
        &self.secp
    }


    // =================================================================
    // Scripts
    // =================================================================

    /// Conditional win branch for `position`, with a CSV fallback to the counterparty.
    pub fn role_script(
        &self,
        contract: &Contract,
        keys: &Participants,
        position: Position,
    ) -> Result<ScriptBuf> {
        let winner = parse_key(&keys.key(position))?;
        let fallback = parse_key(&keys.key(position.counterparty()))?;
        Ok(Builder::new()
            .push_opcode(OP_IF)
            .push_int(script_int(contract.expiry_height)?)
            .push_opcode(OP_CLTV)
            .push_opcode(OP_DROP)
            .push_opcode(OP_SHA256)
            .push_slice(outcome_hash(contract, position))
            .push_opcode(OP_EQUALVERIFY)
            .push_x_only_key(&winner)
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_ELSE)
            .push_int(script_int(self.timeout_csv_blocks)?)
            .push_opcode(OP_CSV)
            .push_opcode(OP_DROP)
            .push_x_only_key(&fallback)
            .push_opcode(OP_CHECKSIG)
            .push_opcode(OP_ENDIF)
            .into_script())
    }

    /// 2-of-2: `<buyer> CHECKSIGVERIFY <seller> CHECKSIG`.
    pub fn cooperative_script(&self, keys: &Participants) -> Result<ScriptBuf> {
        Ok(Builder::new()
            .push_x_only_key(&parse_key(&keys.buyer)?)
            .push_opcode(OP_CHECKSIGVERIFY)
            .push_x_only_key(&parse_key(&keys.seller)?)
            .push_opcode(OP_CHECKSIG)
            .into_script())
    }

    pub fn timeout_script(&self, key: &XOnlyKey) -> Result<ScriptBuf> {
        Ok(Builder::new()
            .push_int(script_int(self.timeout_csv_blocks)?)
            .push_opcode(OP_CSV)
            .push_opcode(OP_DROP)
            .push_x_only_key(&parse_key(key)?)
            .push_opcode(OP_CHECKSIG)
            .into_script())
    }

    pub fn sweep_script(&self, key: &XOnlyKey) -> Result<ScriptBuf> {
        Ok(Builder::new()
            .push_x_only_key(&parse_key(key)?)
            .push_opcode(OP_CHECKSIG)
            .into_script())
    }

    /// Script of leaf `kind` for a VTXO held at `owner`.
    pub fn leaf_script(
        &self,
        kind: ScriptPathKind,
        contract: &Contract,
        keys: &Participants,
        owner: Position,
    ) -> Result<ScriptBuf> {
        match kind {
            ScriptPathKind::Buyer => self.role_script(contract, keys, Position::Buyer),
            ScriptPathKind::Seller => self.role_script(contract, keys, Position::Seller),
            ScriptPathKind::Cooperative => self.cooperative_script(keys),
            ScriptPathKind::Timeout => self.timeout_script(&keys.key(owner)),
            ScriptPathKind::Sweep => self.sweep_script(&keys.key(owner)),
        }
    }

    // =================================================================
    // Taproot outputs
    // =================================================================

    /// The five-leaf output backing a VTXO held at `owner`.
    pub fn vtxo_output(
        &self,
        contract: &Contract,
        keys: &Participants,
        owner: Position,
    ) -> Result<TaprootOutput> {
        let scripts = VTXO_LEAVES
            .iter()
            .map(|kind| self.leaf_script(*kind, contract, keys, owner))
            .collect::<Result<Vec<_>>>()?;
        TaprootOutput::new(&self.secp, NUMS_INTERNAL_KEY, scripts)
    }

    /// Setup output: both parties' collateral locked under the cooperative leaf.
    pub fn coinflip_output(&self, keys: &Participants) -> Result<TaprootOutput> {
        TaprootOutput::new(
            &self.secp,
            NUMS_INTERNAL_KEY,
            vec![self.cooperative_script(keys)?],
        )
    }

    /// Final output: either conditional win branch, or cooperative.
    pub fn final_output(&self, contract: &Contract, keys: &Participants) -> Result<TaprootOutput> {
        let scripts = vec![
            self.role_script(contract, keys, Position::Buyer)?,
            self.role_script(contract, keys, Position::Seller)?,
            self.cooperative_script(keys)?,
        ];
        TaprootOutput::new(&self.secp, NUMS_INTERNAL_KEY, scripts)
    }

    // =================================================================
    // Transactions
    // =================================================================

    /// Setup, final and settlement transactions paying the full notional to `winner`.
    pub fn settlement_chain(
        &self,
        contract: &Contract,
        keys: &Participants,
        buyer_vtxo: &Vtxo,
        seller_vtxo: &Vtxo,
        winner: Position,
    ) -> Result<SettlementChain> {
        let notional = btc_to_amount(contract.size)?;
        let coinflip = self.coinflip_output(keys)?;
        let final_output = self.final_output(contract, keys)?;

        let mut setup = unsigned(absolute::LockTime::ZERO);
        for (vtxo, position) in [(buyer_vtxo, Position::Buyer), (seller_vtxo, Position::Seller)] {
            setup.input.push(self.vtxo_input(
                contract,
                keys,
                vtxo,
                position,
                ScriptPathKind::Cooperative,
                None,
            )?);
        }
        setup.output.push(TxOut {
            value: notional,
            script_pubkey: coinflip.script_pubkey(),
        });

        let mut final_tx = unsigned(absolute::LockTime::ZERO);
        final_tx.input.push(spend(
            OutPoint::new(setup.compute_txid(), 0),
            Sequence::MAX,
            witness::script_path(
                &PLACEHOLDER_SIGNATURE,
                &keys.buyer,
                coinflip.script(0)?,
                &coinflip.control_block(0)?,
            ),
        ));
        final_tx.output.push(TxOut {
            value: notional,
            script_pubkey: final_output.script_pubkey(),
        });

        let winner_leaf = match winner {
            Position::Buyer => 0,
            Position::Seller => 1,
        };
        let mut settlement = unsigned(height_lock_time(contract.expiry_height)?);
        settlement.input.push(spend(
            OutPoint::new(final_tx.compute_txid(), 0),
            Sequence::ENABLE_LOCKTIME_NO_RBF,
            witness::script_path(
                &PLACEHOLDER_SIGNATURE,
                &keys.key(winner),
                final_output.script(winner_leaf)?,
                &final_output.control_block(winner_leaf)?,
            ),
        ));
        settlement.output.push(TxOut {
            value: notional,
            script_pubkey: key_path_script_pubkey(&self.secp, &keys.key(winner))?,
        });

        debug!(
            contract_id = %contract.id,
            setup = %txid(&setup),
            final_tx = %txid(&final_tx),
            settlement = %txid(&settlement),
            winner = %winner,
            "built settlement chain"
        );
        Ok(SettlementChain {
            setup,
            final_tx,
            settlement,
        })
    }

    /// Spend both contract VTXOs through `leaf`, paying `payouts` (zero amounts skipped).
    pub fn exit_transaction(
        &self,
        contract: &Contract,
        keys: &Participants,
        vtxos: &[(&Vtxo, Position)],
        leaf: ScriptPathKind,
        payouts: &[(XOnlyKey, Decimal)],
    ) -> Result<Transaction> {
        if vtxos.is_empty() {
            return Err(HashPerpError::Script("exit spends no VTXOs".to_string()));
        }
        let lock_time = if matches!(leaf, ScriptPathKind::Buyer | ScriptPathKind::Seller) {
            height_lock_time(contract.expiry_height)?
        } else {
            absolute::LockTime::ZERO
        };
        let mut tx = unsigned(lock_time);
        for (vtxo, position) in vtxos {
            tx.input
                .push(self.vtxo_input(contract, keys, vtxo, *position, leaf, None)?);
        }
        for (key, amount) in payouts {
            let value = btc_to_amount(*amount)?;
            if value == Amount::ZERO {
                continue;
            }
            tx.output.push(TxOut {
                value,
                script_pubkey: key_path_script_pubkey(&self.secp, key)?,
            });
        }
        debug!(contract_id = %contract.id, txid = %txid(&tx), leaf = %leaf, "built exit transaction");
        Ok(tx)
    }

    /// Single-VTXO spend through the sweep leaf back to its owner.
    ///
    /// With `signature` the witness is complete and the transaction can be
    /// escrowed; without it the placeholder is used.
    pub fn sweep_transaction(
        &self,
        contract: &Contract,
        keys: &Participants,
        vtxo: &Vtxo,
        owner: Position,
        signature: Option<&[u8]>,
    ) -> Result<Transaction> {
        let mut tx = unsigned(absolute::LockTime::ZERO);
        tx.input.push(self.vtxo_input(
            contract,
            keys,
            vtxo,
            owner,
            ScriptPathKind::Sweep,
            signature,
        )?);
        tx.output.push(TxOut {
            value: btc_to_amount(vtxo.amount)?,
            script_pubkey: key_path_script_pubkey(&self.secp, &keys.key(owner))?,
        });
        debug!(vtxo_id = %vtxo.id, txid = %txid(&tx), "built sweep transaction");
        Ok(tx)
    }

    /// Input spending `vtxo` through `leaf` with a script-path witness.
    fn vtxo_input(
        &self,
        contract: &Contract,
        keys: &Participants,
        vtxo: &Vtxo,
        owner: Position,
        leaf: ScriptPathKind,
        signature: Option<&[u8]>,
    ) -> Result<TxIn> {
        let output = self.vtxo_output(contract, keys, owner)?;
        let index = leaf_index(leaf);
        let signer = match leaf {
            ScriptPathKind::Buyer => keys.buyer,
            ScriptPathKind::Seller => keys.seller,
            ScriptPathKind::Cooperative | ScriptPathKind::Timeout | ScriptPathKind::Sweep => {
                keys.key(owner)
            }
        };
        let sequence = match leaf {
            ScriptPathKind::Timeout => u16::try_from(self.timeout_csv_blocks)
                .map(Sequence::from_height)
                .map_err(|_| HashPerpError::Script("csv delay out of range".to_string()))?,
            ScriptPathKind::Buyer | ScriptPathKind::Seller => Sequence::ENABLE_LOCKTIME_NO_RBF,
            ScriptPathKind::Cooperative | ScriptPathKind::Sweep => Sequence::MAX,
        };
        Ok(spend(
            vtxo_outpoint(vtxo.id),
            sequence,
            witness::script_path(
                signature.unwrap_or(&PLACEHOLDER_SIGNATURE),
                &signer,
                output.script(index)?,
                &output.control_block(index)?,
            ),
        ))
    }
}

/// Leaf order of every VTXO output.
pub const VTXO_LEAVES: [ScriptPathKind; 5] = [
    ScriptPathKind::Buyer,
    ScriptPathKind::Seller,
    ScriptPathKind::Cooperative,
    ScriptPathKind::Timeout,
    ScriptPathKind::Sweep,
];

#[must_use]
pub fn leaf_index(kind: ScriptPathKind) -> usize {
    match kind {
        ScriptPathKind::Buyer => 0,
        ScriptPathKind::Seller => 1,
        ScriptPathKind::Cooperative => 2,
        ScriptPathKind::Timeout => 3,
        ScriptPathKind::Sweep => 4,
    }
}

fn spend(previous_output: OutPoint, sequence: Sequence, witness: Witness) -> TxIn {
    TxIn {
        previous_output,
        script_sig: ScriptBuf::new(),
        sequence,
        witness,
    }
}

fn script_int(n: u64) -> Result<i64> {
    i64::try_from(n).map_err(|_| HashPerpError::Script(format!("{n} does not fit a script number")))
}
