use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::money::Cents;

/// Hot-reloadable knobs, mirrored 1:1 with the `runtime_config` table. See
/// [`RuntimeConfigValues`] for the typed projection used by the rest of the
/// server; this type is the raw per-row shape used by the durable store and
/// the admin config-editing surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfigRow {
    pub key: String,
    pub value: String,
    pub value_type: String,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RuntimeConfigValues {
    pub commission_flat: Cents,
    pub payout_tax_percent: i64,
    pub draw_commission_enabled: bool,
    pub min_stake: Cents,
    pub game_expiry_minutes: i64,
    pub idle_warning_seconds: i64,
    pub idle_forfeit_seconds: i64,
    pub disconnect_grace_seconds: i64,
    pub withdraw_provider_fee_percent: i64,
    pub min_withdraw: Cents,
    /// Governs queue-entry expiry handling: refund to the payment provider
    /// versus converting the stake straight to `player_winnings` credit.
    pub expired_stake_becomes_credit: bool,
}

impl Default for RuntimeConfigValues {
    fn default() -> Self {
        Self {
            commission_flat: 1000,
            payout_tax_percent: 15,
            draw_commission_enabled: true,
            min_stake: 1000,
            game_expiry_minutes: 5,
            idle_warning_seconds: 45,
            idle_forfeit_seconds: 90,
            disconnect_grace_seconds: 120,
            withdraw_provider_fee_percent: 2,
            min_withdraw: 5000,
            expired_stake_becomes_credit: true,
        }
    }
}

impl RuntimeConfigValues {
    /// Project the key/value rows from the durable store on top of the
    /// defaults, so a partially-seeded config table never panics the server.
    pub fn from_rows(rows: &[RuntimeConfigRow]) -> Self {
        let mut values = Self::default();
        for row in rows {
            apply_row(&mut values, row);
        }
        values
    }
}

fn apply_row(values: &mut RuntimeConfigValues, row: &RuntimeConfigRow) {
    macro_rules! set_i64 {
        ($field:ident) => {
            if let Ok(v) = row.value.parse::<i64>() {
                values.$field = v;
            }
        };
    }
    macro_rules! set_bool {
        ($field:ident) => {
            if let Ok(v) = row.value.parse::<bool>() {
                values.$field = v;
            }
        };
    }
    match row.key.as_str() {
        "commission_flat" => set_i64!(commission_flat),
        "payout_tax_percent" => set_i64!(payout_tax_percent),
        "draw_commission_enabled" => set_bool!(draw_commission_enabled),
        "min_stake" => set_i64!(min_stake),
        "game_expiry_minutes" => set_i64!(game_expiry_minutes),
        "idle_warning_seconds" => set_i64!(idle_warning_seconds),
        "idle_forfeit_seconds" => set_i64!(idle_forfeit_seconds),
        "disconnect_grace_seconds" => set_i64!(disconnect_grace_seconds),
        "withdraw_provider_fee_percent" => set_i64!(withdraw_provider_fee_percent),
        "min_withdraw" => set_i64!(min_withdraw),
        "expired_stake_becomes_credit" => set_bool!(expired_stake_becomes_credit),
        _ => (),
    }
}
