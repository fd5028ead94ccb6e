//! Validation of the anchor transaction, the mandatory first transaction of
//! every L2 block.

use alloy::primitives::{Address, B256};
use rollup_common::{anchor_selector, GOLDEN_TOUCH_ADDRESS};
use thiserror::Error;

use crate::proof_types::{L2Receipt, L2Transaction};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnchorError {
    #[error("anchor transaction sent to {found:?}, expected {expected}")]
    WrongDestination {
        expected: Address,
        found: Option<Address>,
    },

    #[error("anchor transaction sent by {found}, expected {expected}")]
    WrongSender { expected: Address, found: Address },

    #[error("anchor transaction does not call the anchor entrypoint")]
    WrongSelector,

    #[error("anchor transaction {0} failed")]
    Failed(B256),

    #[error("anchor receipt belongs to transaction {found}, expected {expected}")]
    ReceiptMismatch { expected: B256, found: B256 },
}

#[derive(Clone, Debug)]
pub struct AnchorTxValidator {
    l2_protocol_address: Address,
    golden_touch_address: Address,
    selector: [u8; 4],
}

impl AnchorTxValidator {
    pub fn new(l2_protocol_address: Address) -> Self {
        Self {
            l2_protocol_address,
            golden_touch_address: GOLDEN_TOUCH_ADDRESS,
            selector: anchor_selector(),
        }
    }

    pub fn validate_anchor_tx(&self, tx: &L2Transaction) -> Result<(), AnchorError> {
        if tx.to != Some(self.l2_protocol_address) {
            return Err(AnchorError::WrongDestination {
                expected: self.l2_protocol_address,
                found: tx.to,
            });
        }

        if tx.from != self.golden_touch_address {
            return Err(AnchorError::WrongSender {
                expected: self.golden_touch_address,
                found: tx.from,
            });
        }

        if tx.input.get(..4) != Some(&self.selector[..]) {
            return Err(AnchorError::WrongSelector);
        }

        Ok(())
    }

    pub fn validate_anchor_receipt(
        &self,
        tx: &L2Transaction,
        receipt: &L2Receipt,
    ) -> Result<(), AnchorError> {
        if receipt.tx_hash != tx.hash {
            return Err(AnchorError::ReceiptMismatch {
                expected: tx.hash,
                found: receipt.tx_hash,
            });
        }
        if !receipt.status {
            return Err(AnchorError::Failed(tx.hash));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use alloy::primitives::{address, Bytes};

    use super::*;

    const L2_PROTOCOL: Address = address!("1670000000000000000000000000000000010001");

    fn anchor_tx() -> L2Transaction {
        let mut input = anchor_selector().to_vec();
        input.extend_from_slice(&[0u8; 128]);
        L2Transaction {
            hash: B256::repeat_byte(1),
            from: GOLDEN_TOUCH_ADDRESS,
            to: Some(L2_PROTOCOL),
            input: Bytes::from(input),
        }
    }

    #[test]
    fn accepts_valid_anchor() {
        let validator = AnchorTxValidator::new(L2_PROTOCOL);
        let tx = anchor_tx();
        validator.validate_anchor_tx(&tx).unwrap();
        validator
            .validate_anchor_receipt(
                &tx,
                &L2Receipt {
                    tx_hash: tx.hash,
                    status: true,
                    encoded: Bytes::new(),
                },
            )
            .unwrap();
    }

    #[test]
    fn rejects_bad_anchors() {
        let validator = AnchorTxValidator::new(L2_PROTOCOL);

        let mut tx = anchor_tx();
        tx.to = None;
        assert!(matches!(
            validator.validate_anchor_tx(&tx),
            Err(AnchorError::WrongDestination { .. })
        ));

        let mut tx = anchor_tx();
        tx.from = Address::repeat_byte(9);
        assert!(matches!(
            validator.validate_anchor_tx(&tx),
            Err(AnchorError::WrongSender { .. })
        ));

        let mut tx = anchor_tx();
        tx.input = Bytes::from_static(&[0xde, 0xad]);
        assert_eq!(
            validator.validate_anchor_tx(&tx),
            Err(AnchorError::WrongSelector)
        );
    }

    #[test]
    fn rejects_failed_receipt() {
        let validator = AnchorTxValidator::new(L2_PROTOCOL);
        let tx = anchor_tx();
        let receipt = L2Receipt {
            tx_hash: tx.hash,
            status: false,
            encoded: Bytes::new(),
        };
        assert_eq!(
            validator.validate_anchor_receipt(&tx, &receipt),
            Err(AnchorError::Failed(tx.hash))
        );
    }
}
