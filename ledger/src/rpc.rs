//! Wire types for `GET /v1/balances/{identity}` and their mapping onto
//! [`ValidationResult`].

use serde::{Deserialize, Deserializer};

use sieve_types::{Activity, Identity, RemoteError, RemoteErrorKind, ValidationResult};

#[derive(Debug, Deserialize)]
pub(crate) struct BalanceEnvelope {
    #[serde(default)]
    pub balance: Option<BalanceBody>,
}

/// The `balance` object. Numeric fields arrive as JSON numbers or as decimal
/// strings depending on the node, so both are accepted.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BalanceBody {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "flexible_u64")]
    pub balance: Option<u64>,
    #[serde(default, deserialize_with = "flexible_u64")]
    pub valid_for_tick: Option<u64>,
    #[serde(default, deserialize_with = "flexible_u64")]
    pub incoming_amount: Option<u64>,
    #[serde(default, deserialize_with = "flexible_u64")]
    pub outgoing_amount: Option<u64>,
    #[serde(default, deserialize_with = "flexible_u64")]
    pub number_of_incoming_transfers: Option<u64>,
    #[serde(default, deserialize_with = "flexible_u64")]
    pub number_of_outgoing_transfers: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String),
}

fn flexible_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    match Option::<NumberOrString>::deserialize(deserializer)? {
        None => Ok(None),
        Some(NumberOrString::Number(n)) => Ok(Some(n)),
        Some(NumberOrString::String(s)) if s.trim().is_empty() => Ok(None),
        Some(NumberOrString::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid amount {s:?}: {e}"))),
    }
}

impl BalanceBody {
    fn activity(&self) -> Option<Activity> {
        let reported = [
            self.incoming_amount,
            self.outgoing_amount,
            self.number_of_incoming_transfers,
            self.number_of_outgoing_transfers,
        ];
        if reported.iter().all(Option::is_none) {
            return None;
        }
        Some(Activity {
            incoming_amount: self.incoming_amount.unwrap_or(0),
            outgoing_amount: self.outgoing_amount.unwrap_or(0),
            incoming_transfers: clamp_u32(self.number_of_incoming_transfers),
            outgoing_transfers: clamp_u32(self.number_of_outgoing_transfers),
        })
    }
}

fn clamp_u32(value: Option<u64>) -> u32 {
    value.map_or(0, |v| u32::try_from(v).unwrap_or(u32::MAX))
}

/// Interpret a 2xx body.
///
/// Existence is decided by `validForTick`: a balance entry without it is an
/// identity the ledger has never seen.
pub(crate) fn interpret_success(identity: Identity, body: &[u8]) -> ValidationResult {
    let envelope: BalanceEnvelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            return ValidationResult::indeterminate(
                identity,
                RemoteError::new(RemoteErrorKind::MalformedResponse, e.to_string()),
            );
        }
    };

    let Some(balance) = envelope.balance else {
        return ValidationResult::absent(identity);
    };

    if let Some(reported) = balance.id.as_deref()
        && !reported.eq_ignore_ascii_case(identity.as_str())
    {
        return ValidationResult::indeterminate(
            identity,
            RemoteError::new(
                RemoteErrorKind::MalformedResponse,
                format!("ledger answered for a different identity: {reported}"),
            ),
        );
    }

    match balance.valid_for_tick {
        Some(tick) => {
            let Ok(tick) = u32::try_from(tick) else {
                return ValidationResult::indeterminate(
                    identity,
                    RemoteError::new(
                        RemoteErrorKind::MalformedResponse,
                        format!("validForTick out of range: {tick}"),
                    ),
                );
            };
            ValidationResult::present(
                identity,
                balance.balance.unwrap_or(0),
                tick,
                balance.activity(),
            )
        }
        None => ValidationResult::absent(identity),
    }
}
