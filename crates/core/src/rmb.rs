//! Chinese capital-numeral rendering of currency amounts.
//!
//! The output lands on printed financial documents, so the digit tables and
//! the zero-suppression rules follow the standard 大写金额 conventions
//! exactly: 零壹贰叁肆伍陆柒捌玖 digits, 拾佰仟 in-group units, 万/亿/万亿
//! group units, 角/分 for the fractional part and 整 for whole amounts.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

const DIGITS: [char; 10] = ['零', '壹', '贰', '叁', '肆', '伍', '陆', '柒', '捌', '玖'];
const IN_GROUP_UNITS: [&str; 4] = ["仟", "佰", "拾", ""];
const GROUP_UNITS: [&str; 4] = ["", "万", "亿", "万亿"];

/// Converts an amount into Chinese currency words. Fractions are rounded to
/// the cent. `with_prefix` prepends 人民币; negative amounts get a 负 prefix.
pub fn convert_to_rmb(amount: Decimal, with_prefix: bool) -> String {
    let prefix = if with_prefix { "人民币" } else { "" };

    let negative = amount.is_sign_negative();
    let absolute = amount.abs();
    let mut yuan = absolute.trunc().to_u64().unwrap_or(0);
    // half away from zero, not banker's rounding: 0.005 becomes one fen
    let mut cents = ((absolute - absolute.trunc()) * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_u64()
        .unwrap_or(0);
    if cents >= 100 {
        yuan += 1;
        cents -= 100;
    }

    if yuan == 0 && cents == 0 {
        return format!("{prefix}零元整");
    }

    let mut words = String::new();
    if negative {
        words.push('负');
    }
    if yuan > 0 {
        words.push_str(&integer_words(yuan));
        words.push('元');
    }

    let jiao = (cents / 10) as usize;
    let fen = (cents % 10) as usize;
    if cents == 0 {
        words.push('整');
    } else {
        if jiao > 0 {
            words.push(DIGITS[jiao]);
            words.push('角');
        }
        if fen > 0 {
            if jiao == 0 && yuan > 0 {
                words.push('零');
            }
            words.push(DIGITS[fen]);
            words.push('分');
        }
    }

    format!("{prefix}{words}")
}

fn integer_words(value: u64) -> String {
    let mut groups = Vec::new();
    let mut rest = value;
    while rest > 0 {
        groups.push((rest % 10_000) as u16);
        rest /= 10_000;
    }

    let mut words = String::new();
    for (index, &group) in groups.iter().enumerate().rev() {
        if group == 0 {
            // an all-zero group between significant groups collapses to 零
            if !words.is_empty() && !words.ends_with('零') {
                words.push('零');
            }
            continue;
        }

        // a group under 1000 leaves a gap that reads as 零 (e.g. 十万零二百)
        if !words.is_empty() && group < 1000 && !words.ends_with('零') {
            words.push('零');
        }
        words.push_str(&group_words(group));
        words.push_str(GROUP_UNITS.get(index).copied().unwrap_or(""));
    }

    while words.ends_with('零') {
        words.pop();
    }
    words
}

fn group_words(group: u16) -> String {
    let digits =
        [(group / 1000) as usize, (group / 100 % 10) as usize, (group / 10 % 10) as usize, (group % 10) as usize];

    let mut words = String::new();
    let mut zero_gap = false;
    for (position, &digit) in digits.iter().enumerate() {
        if digit == 0 {
            zero_gap = !words.is_empty();
            continue;
        }
        if zero_gap {
            words.push('零');
            zero_gap = false;
        }
        words.push(DIGITS[digit]);
        words.push_str(IN_GROUP_UNITS[position]);
    }
    words
}
