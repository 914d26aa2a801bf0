// Glicko-2 constants
pub const DEFAULT_RATING: f64 = 1500.0;
pub const DEFAULT_RATING_DEVIATION: f64 = 350.0;
pub const DEFAULT_VOLATILITY: f64 = 0.06;
// Conversion factor between the public Elo-like scale and the internal scale
pub const GLICKO_SCALE: f64 = 173.7178;
pub const DEFAULT_TAU: f64 = 0.5;
pub const CONVERGENCE_TOLERANCE: f64 = 1e-6;
pub const MAX_VOLATILITY_ITERATIONS: u32 = 100;
// Deviation bounds on the public scale
pub const RATING_DEVIATION_FLOOR: f64 = 30.0;
pub const RATING_DEVIATION_CEILING: f64 = DEFAULT_RATING_DEVIATION;
pub const VOLATILITY_FLOOR: f64 = 1e-4;
// The synthetic opponent used for reference-time comparisons. A reference
// time is a precise benchmark, so its deviation sits at the floor.
pub const REFERENCE_RATING: f64 = DEFAULT_RATING;
pub const REFERENCE_RATING_DEVIATION: f64 = RATING_DEVIATION_FLOOR;
