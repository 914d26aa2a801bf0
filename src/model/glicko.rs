use std::f64::consts::PI;

use thiserror::Error;

use crate::{
    database::db_structs::RatingRecord,
    model::{
        constants::{
            CONVERGENCE_TOLERANCE, DEFAULT_RATING, DEFAULT_RATING_DEVIATION, DEFAULT_TAU, DEFAULT_VOLATILITY,
            GLICKO_SCALE, MAX_VOLATILITY_ITERATIONS, RATING_DEVIATION_CEILING, RATING_DEVIATION_FLOOR, VOLATILITY_FLOOR
        },
        structures::match_outcome::OutcomeScore
    }
};

#[derive(Debug, Error, PartialEq)]
pub enum RatingError {
    #[error("opponent and score counts do not match: {opponents} opponents, {scores} scores")]
    InvalidInput { opponents: usize, scores: usize },

    #[error("rating triple is unusable: deviation {deviation}, volatility {volatility}")]
    InvalidTriple { deviation: f64, volatility: f64 },

    #[error("volatility update failed to converge within {max_iterations} iterations")]
    ConvergenceFailure { max_iterations: u32 }
}

/// System constants for the update engine. `tau` constrains how fast
/// volatility may change; the bounds clamp the public-scale outputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Glicko2Config {
    pub tau: f64,
    pub convergence_tolerance: f64,
    pub max_iterations: u32,
    pub deviation_floor: f64,
    pub deviation_ceiling: f64,
    pub volatility_floor: f64
}

impl Default for Glicko2Config {
    fn default() -> Self {
        Glicko2Config {
            tau: DEFAULT_TAU,
            convergence_tolerance: CONVERGENCE_TOLERANCE,
            max_iterations: MAX_VOLATILITY_ITERATIONS,
            deviation_floor: RATING_DEVIATION_FLOOR,
            deviation_ceiling: RATING_DEVIATION_CEILING,
            volatility_floor: VOLATILITY_FLOOR
        }
    }
}

/// A public-scale (rating, deviation, volatility) triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingTriple {
    pub rating: f64,
    pub deviation: f64,
    pub volatility: f64
}

impl RatingTriple {
    pub fn new_default() -> RatingTriple {
        RatingTriple {
            rating: DEFAULT_RATING,
            deviation: DEFAULT_RATING_DEVIATION,
            volatility: DEFAULT_VOLATILITY
        }
    }
}

impl From<&RatingRecord> for RatingTriple {
    fn from(record: &RatingRecord) -> Self {
        RatingTriple {
            rating: record.rating,
            deviation: record.rating_deviation,
            volatility: record.volatility
        }
    }
}

fn g(phi: f64) -> f64 {
    1.0 / (1.0 + 3.0 * phi * phi / (PI * PI)).sqrt()
}

fn expected_score(mu: f64, mu_j: f64, phi_j: f64) -> f64 {
    1.0 / (1.0 + (-g(phi_j) * (mu - mu_j)).exp())
}

fn to_internal(triple: &RatingTriple) -> (f64, f64) {
    (
        (triple.rating - DEFAULT_RATING) / GLICKO_SCALE,
        triple.deviation / GLICKO_SCALE
    )
}

fn from_internal(mu: f64, phi: f64) -> (f64, f64) {
    (GLICKO_SCALE * mu + DEFAULT_RATING, GLICKO_SCALE * phi)
}

fn validate_triple(triple: &RatingTriple) -> Result<(), RatingError> {
    let usable = triple.rating.is_finite()
        && triple.deviation.is_finite()
        && triple.volatility.is_finite()
        && triple.deviation > 0.0
        && triple.volatility > 0.0;

    if usable {
        Ok(())
    } else {
        Err(RatingError::InvalidTriple {
            deviation: triple.deviation,
            volatility: triple.volatility
        })
    }
}

/// Computes one player's post-period triple from the pre-period snapshot.
///
/// With an empty opponent list this is the inactivity branch: deviation
/// inflates, rating and volatility are untouched. Otherwise the full
/// Glicko-2 update runs, including the iterative volatility solve.
/// Deterministic, side-effect free; the result's deviation is clamped to
/// the configured bounds and volatility to a positive floor.
pub fn rate(
    player: &RatingTriple,
    opponents: &[RatingTriple],
    scores: &[OutcomeScore],
    config: &Glicko2Config
) -> Result<RatingTriple, RatingError> {
    if opponents.len() != scores.len() {
        return Err(RatingError::InvalidInput {
            opponents: opponents.len(),
            scores: scores.len()
        });
    }

    validate_triple(player)?;
    for opponent in opponents {
        validate_triple(opponent)?;
    }

    if opponents.is_empty() {
        return Ok(decay(player, config));
    }

    let (mu, phi) = to_internal(player);

    let mut v_inv = 0.0;
    let mut delta_sum = 0.0;
    for (opponent, score) in opponents.iter().zip(scores) {
        let (mu_j, phi_j) = to_internal(opponent);
        let g_j = g(phi_j);
        let e_j = expected_score(mu, mu_j, phi_j);

        v_inv += g_j * g_j * e_j * (1.0 - e_j);
        delta_sum += g_j * (score.value() - e_j);
    }

    let v = 1.0 / v_inv;
    let delta = v * delta_sum;

    let sigma_prime = solve_volatility(delta, phi, v, player.volatility, config)?;

    let phi_star = (phi * phi + sigma_prime * sigma_prime).sqrt();
    let phi_prime = 1.0 / (1.0 / (phi_star * phi_star) + 1.0 / v).sqrt();
    let mu_prime = mu + phi_prime * phi_prime * delta_sum;

    let (rating, deviation) = from_internal(mu_prime, phi_prime);

    Ok(RatingTriple {
        rating,
        deviation: deviation.clamp(config.deviation_floor, config.deviation_ceiling),
        volatility: sigma_prime.max(config.volatility_floor)
    })
}

/// Zero-games branch: `φ' = sqrt(φ² + σ²)`, pure in (φ, σ). Runs every
/// period for every player ever seen, so uncertainty grows with
/// inactivity up to the configured ceiling.
pub fn decay(player: &RatingTriple, config: &Glicko2Config) -> RatingTriple {
    let (_, phi) = to_internal(player);
    let phi_star = (phi * phi + player.volatility * player.volatility).sqrt();

    RatingTriple {
        rating: player.rating,
        deviation: (GLICKO_SCALE * phi_star).clamp(config.deviation_floor, config.deviation_ceiling),
        volatility: player.volatility
    }
}

/// Solves `f(x) = 0` for `x = ln(σ'²)` with the Illinois variant of
/// regula falsi, as prescribed by the Glicko-2 paper. Both the initial
/// bracketing walk and the refinement loop are bounded by the configured
/// iteration cap; exhausting it is a hard failure, never a truncated
/// result.
fn solve_volatility(delta: f64, phi: f64, v: f64, sigma: f64, config: &Glicko2Config) -> Result<f64, RatingError> {
    let a = (sigma * sigma).ln();
    let delta2 = delta * delta;
    let phi2 = phi * phi;
    let tau = config.tau;

    let f = |x: f64| {
        let ex = x.exp();
        let num = ex * (delta2 - phi2 - v - ex);
        let den = 2.0 * (phi2 + v + ex) * (phi2 + v + ex);
        num / den - (x - a) / (tau * tau)
    };

    let mut lower = a;
    let mut upper = if delta2 > phi2 + v {
        (delta2 - phi2 - v).ln()
    } else {
        let mut k = 1u32;
        while f(a - f64::from(k) * tau) < 0.0 {
            k += 1;
            if k > config.max_iterations {
                return Err(RatingError::ConvergenceFailure {
                    max_iterations: config.max_iterations
                });
            }
        }
        a - f64::from(k) * tau
    };

    let mut f_lower = f(lower);
    let mut f_upper = f(upper);

    let mut iterations = 0u32;
    while (upper - lower).abs() > config.convergence_tolerance {
        if iterations >= config.max_iterations {
            return Err(RatingError::ConvergenceFailure {
                max_iterations: config.max_iterations
            });
        }

        let candidate = lower + (lower - upper) * f_lower / (f_upper - f_lower);
        let f_candidate = f(candidate);

        if f_candidate * f_upper <= 0.0 {
            lower = upper;
            f_lower = f_upper;
        } else {
            f_lower /= 2.0;
        }

        upper = candidate;
        f_upper = f_candidate;
        iterations += 1;
    }

    Ok((lower / 2.0).exp())
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use crate::model::{
        constants::{DEFAULT_RATING_DEVIATION, GLICKO_SCALE},
        glicko::{decay, from_internal, rate, to_internal, Glicko2Config, RatingError, RatingTriple},
        structures::match_outcome::OutcomeScore::{Draw, Loss, Win}
    };

    fn triple(rating: f64, deviation: f64, volatility: f64) -> RatingTriple {
        RatingTriple {
            rating,
            deviation,
            volatility
        }
    }

    /// The worked example from Glickman's Glicko-2 paper.
    #[test]
    fn test_paper_example() {
        let player = triple(1500.0, 200.0, 0.06);
        let opponents = [
            triple(1400.0, 30.0, 0.06),
            triple(1550.0, 100.0, 0.06),
            triple(1700.0, 300.0, 0.06),
        ];
        let scores = [Win, Loss, Loss];

        let result = rate(&player, &opponents, &scores, &Glicko2Config::default()).unwrap();

        assert_abs_diff_eq!(result.rating, 1464.06, epsilon = 0.01);
        assert_abs_diff_eq!(result.deviation, 151.52, epsilon = 0.01);
        assert_abs_diff_eq!(result.volatility, 0.05999, epsilon = 0.0001);
    }

    #[test]
    fn test_scale_round_trip_is_identity() {
        let player = triple(1737.0, 81.5, 0.06);
        let (mu, phi) = to_internal(&player);
        let (rating, deviation) = from_internal(mu, phi);

        assert_abs_diff_eq!(rating, player.rating, epsilon = 1e-9);
        assert_abs_diff_eq!(deviation, player.deviation, epsilon = 1e-9);
    }

    #[test]
    fn test_mismatched_inputs_rejected() {
        let player = RatingTriple::new_default();
        let opponents: [RatingTriple; 0] = [];

        let result = rate(&player, &opponents, &[Win], &Glicko2Config::default());

        assert_eq!(
            result,
            Err(RatingError::InvalidInput {
                opponents: 0,
                scores: 1
            })
        );
    }

    #[test]
    fn test_non_positive_deviation_rejected() {
        let player = triple(1500.0, 0.0, 0.06);

        let result = rate(&player, &[], &[], &Glicko2Config::default());

        assert!(matches!(result, Err(RatingError::InvalidTriple { .. })));
    }

    #[test]
    fn test_zero_games_inflates_deviation_only() {
        let config = Glicko2Config::default();
        let player = triple(1623.0, 120.0, 0.06);

        let decayed = decay(&player, &config);

        assert_eq!(decayed.rating, player.rating);
        assert_eq!(decayed.volatility, player.volatility);
        assert!(decayed.deviation > player.deviation);

        // Matches the closed form on the internal scale
        let phi = player.deviation / GLICKO_SCALE;
        let expected = GLICKO_SCALE * (phi * phi + player.volatility * player.volatility).sqrt();
        assert_abs_diff_eq!(decayed.deviation, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_decay_respects_ceiling() {
        let config = Glicko2Config::default();
        let mut player = triple(1500.0, 340.0, 0.06);

        for _ in 0..100 {
            player = decay(&player, &config);
            assert!(player.deviation <= DEFAULT_RATING_DEVIATION);
        }

        assert_eq!(player.deviation, DEFAULT_RATING_DEVIATION);
    }

    #[test]
    fn test_win_loss_draw_symmetry() {
        let config = Glicko2Config::default();
        let player = RatingTriple::new_default();
        let opponent = RatingTriple::new_default();

        let won = rate(&player, &[opponent], &[Win], &config).unwrap();
        let lost = rate(&player, &[opponent], &[Loss], &config).unwrap();
        let drew = rate(&player, &[opponent], &[Draw], &config).unwrap();

        assert!(won.rating > player.rating);
        assert!(lost.rating < player.rating);
        assert_abs_diff_eq!(drew.rating, player.rating, epsilon = 1e-6);

        // Equal starting triples make the update mirror-symmetric
        assert_abs_diff_eq!(won.rating - player.rating, player.rating - lost.rating, epsilon = 1e-6);
        assert!(won.deviation < player.deviation);
    }

    #[test]
    fn test_deterministic_output() {
        let config = Glicko2Config::default();
        let player = triple(1612.0, 95.0, 0.058);
        let opponents = [triple(1400.0, 60.0, 0.06), triple(1750.0, 240.0, 0.061)];
        let scores = [Loss, Win];

        let first = rate(&player, &opponents, &scores, &config).unwrap();
        let second = rate(&player, &opponents, &scores, &config).unwrap();

        assert_eq!(first.rating.to_bits(), second.rating.to_bits());
        assert_eq!(first.deviation.to_bits(), second.deviation.to_bits());
        assert_eq!(first.volatility.to_bits(), second.volatility.to_bits());
    }

    #[test]
    fn test_deviation_floor_applies() {
        let config = Glicko2Config {
            deviation_floor: 150.0,
            ..Glicko2Config::default()
        };
        let player = triple(1500.0, 160.0, 0.06);
        let opponent = RatingTriple::new_default();

        let result = rate(&player, &[opponent], &[Win], &config).unwrap();

        assert!(result.deviation >= config.deviation_floor);
    }

    #[test]
    fn test_inputs_not_mutated() {
        let config = Glicko2Config::default();
        let player = triple(1500.0, 200.0, 0.06);
        let opponents = [triple(1400.0, 30.0, 0.06)];
        let before = opponents;

        rate(&player, &opponents, &[Win], &config).unwrap();

        assert_eq!(opponents[0], before[0]);
    }
}
