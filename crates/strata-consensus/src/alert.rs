//! Network alerts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strata_types::{Address, BlockHeight, Txid};

use crate::error::InvalidReason;

/// How an alert expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Expires once the chain reaches a height.
    ExpiresAtBlock,
    /// Expires once a block timestamp passes a time.
    ExpiresAtTime,
    /// Demands a minimum client version; never expires on its own.
    ClientVersion,
}

impl AlertKind {
    /// Parses the wire alert type.
    pub fn from_wire(value: u16) -> Result<Self, InvalidReason> {
        match value {
            1 => Ok(Self::ExpiresAtBlock),
            2 => Ok(Self::ExpiresAtTime),
            3 => Ok(Self::ClientVersion),
            other => Err(InvalidReason::InvalidAlertType(other)),
        }
    }
}

/// An accepted alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    /// Carrying transaction.
    pub txid: Txid,
    /// Sender.
    pub sender: Address,
    /// Height at which it was received.
    pub block: BlockHeight,
    /// Expiry rule.
    pub kind: AlertKind,
    /// Height, time or version, depending on `kind`.
    pub expiry_value: u32,
    /// Alert text.
    pub message: String,
}

impl Alert {
    fn expired(&self, height: BlockHeight, time: u64) -> bool {
        match self.kind {
            AlertKind::ExpiresAtBlock => self.expiry_value <= height,
            AlertKind::ExpiresAtTime => u64::from(self.expiry_value) <= time,
            AlertKind::ClientVersion => false,
        }
    }
}

/// Active alerts by txid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertSet {
    alerts: BTreeMap<Txid, Alert>,
}

impl AlertSet {
    /// Adds an alert.
    pub fn insert(&mut self, alert: Alert) {
        self.alerts.insert(alert.txid, alert);
    }

    /// Drops alerts expired at `(height, time)`, returning them.
    pub fn expire(&mut self, height: BlockHeight, time: u64) -> Vec<Alert> {
        let (gone, kept): (BTreeMap<_, _>, BTreeMap<_, _>) = std::mem::take(&mut self.alerts)
            .into_iter()
            .partition(|(_, a)| a.expired(height, time));
        self.alerts = kept;
        gone.into_values().collect()
    }

    /// Active alerts in txid order.
    pub fn iter(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.values()
    }

    /// Number of active alerts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    /// True if there are no active alerts.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(tag: &[u8], kind: AlertKind, expiry_value: u32) -> Alert {
        Alert {
            txid: Txid::digest(tag),
            sender: Address::new("gov"),
            block: 1,
            kind,
            expiry_value,
            message: "notice".into(),
        }
    }

    #[test]
    fn test_expiry_rules() {
        let mut set = AlertSet::default();
        set.insert(alert(b"1", AlertKind::ExpiresAtBlock, 10));
        set.insert(alert(b"2", AlertKind::ExpiresAtTime, 5_000));
        set.insert(alert(b"3", AlertKind::ClientVersion, 2_000));

        assert!(set.expire(9, 4_999).is_empty());
        let gone = set.expire(10, 4_999);
        assert_eq!(gone.len(), 1);
        assert_eq!(gone[0].kind, AlertKind::ExpiresAtBlock);
        assert_eq!(set.expire(u32::MAX, u64::MAX).len(), 1);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_alert_kind_from_wire() {
        assert_eq!(AlertKind::from_wire(3), Ok(AlertKind::ClientVersion));
        assert_eq!(AlertKind::from_wire(4), Err(InvalidReason::InvalidAlertType(4)));
    }
}
