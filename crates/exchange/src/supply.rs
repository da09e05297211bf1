//! World-supply estimation backing the scarcity price model.
//!
//! The exchange reports circulating supply per item id. Total possible
//! supply is not observable, so it is estimated from world generation
//! rates over the playable area. Underestimates are tolerable because the
//! price model caps the scarcity multiplier.

use ironmaker_core::MarketId;

// Playable world boundaries.
const X1: f64 = -5176.0;
const X2: f64 = 5176.0;
const Z1: f64 = -2488.0;
const Z2: f64 = 2488.0;

#[must_use]
pub fn total_chunks() -> f64 {
    ((X2 - X1).abs() * (Z2 - Z1).abs() / 256.0).floor()
}

/// Item ids whose circulating counts sum to a market's base asset supply.
#[must_use]
pub fn item_ids(market: &MarketId) -> Option<&'static [&'static str]> {
    let ids: &'static [&'static str] = match market.as_str() {
        "ston_iron" => &["1", "4"],
        "olog_iron" => &["17", "17:0", "17:1", "17:2"],
        "slog_iron" => &["17:1"],
        "blog_iron" => &["17:2"],
        "diam_iron" => &["264", "56", "57"],
        "gold_iron" => &["266", "14", "41"],
        "coal_iron" => &["263", "263:1", "16"],
        "cobl_iron" => &["4"],
        "sand_iron" => &["12"],
        "wool_iron" => &["35"],
        "whet_iron" => &["296", "295"],
        "sugr_iron" => &["338", "262"],
        "clay_iron" => &["337", "82"],
        "slme_iron" => &["341"],
        "gpow_iron" => &["289"],
        "xtnt_iron" => &["46"],
        "lapi_iron" => &["351:4", "21"],
        "aapl_iron" => &["260"],
        "beef_iron" => &["363", "364"],
        "bmus_iron" => &["39"],
        "rmus_iron" => &["40"],
        "dand_iron" => &["37"],
        "dirt_iron" => &["3"],
        "fish_iron" => &["349", "350"],
        "flnt_iron" => &["318"],
        "fthr_iron" => &["288"],
        "popy_iron" => &["38"],
        "snow_iron" => &["332", "78"],
        "stng_iron" => &["287"],
        "grvl_iron" => &["13"],
        "bone_iron" => &["352"],
        "reds_iron" => &["331", "73"],
        "obsn_iron" => &["49"],
        "cact_iron" => &["81"],
        "arrw_iron" => &["262"],
        "pump_iron" => &["86"],
        "eggs_iron" => &["344"],
        _ => return None,
    };
    Some(ids)
}

/// Estimated total world supply of a market's base asset. `None` if the
/// market has no item mapping, in which case scarcity cannot be computed.
#[must_use]
pub fn world_supply(market: &MarketId) -> Option<f64> {
    item_ids(market)?;

    let per_chunk = match market.base() {
        "diam" | "lapi" => 3.0,
        "gold" => 8.0,
        "coal" => 140.0,
        "reds" => 25.0,
        "ston" | "cobl" => 20_000.0,
        "dirt" => 3_000.0,
        "sand" => 2_000.0,
        "olog" | "slog" | "blog" => 40.0,
        "obsn" => 0.5,
        "clay" => 20.0,
        _ => 100.0,
    };
    Some(total_chunks() * per_chunk)
}
