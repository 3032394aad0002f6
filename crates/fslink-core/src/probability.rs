//! Conversions between probabilities, bayes factors and match weights.
//!
//! Match weights are always base-2 logarithms of bayes factors.

/// Odds `p / (1 - p)`; `+inf` for a probability of one.
pub fn prob_to_bayes_factor(probability: f64) -> f64 {
    if probability == 1.0 {
        f64::INFINITY
    } else {
        probability / (1.0 - probability)
    }
}

/// `log2` of the odds.
pub fn prob_to_match_weight(probability: f64) -> f64 {
    prob_to_bayes_factor(probability).log2()
}

/// `2^weight`.
pub fn match_weight_to_bayes_factor(weight: f64) -> f64 {
    weight.exp2()
}

/// `bf / (1 + bf)`.
pub fn bayes_factor_to_prob(bayes_factor: f64) -> f64 {
    if bayes_factor.is_infinite() {
        return 1.0;
    }
    bayes_factor / (1.0 + bayes_factor)
}

/// Format a multiplier with two decimals and thousands separators,
/// e.g. `12,345.68`.
pub fn format_multiplier(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let digits: Vec<char> = int_part.chars().collect();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*c);
    }

    let sign = if value < 0.0 { "-" } else { "" };
    format!("{}{}.{}", sign, grouped, frac_part)
}
