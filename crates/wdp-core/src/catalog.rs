//! Construction catalogues: pipe diameters, isolation valves, storage tanks.
//!
//! These are static market tables, treated as constants of the domain. All
//! three catalogues are strictly ascending in their key, and selection always
//! picks the smallest tier whose key is at least the requirement. The tank
//! catalogue additionally saturates: demands beyond the largest tier are
//! clamped to it and flagged.

use crate::units::{CubicMetersPerDay, Euros, Millimeters};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// One commercial pipe tier: nominal diameter, wall thickness, cost per meter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipeTier {
    /// Nominal diameter (mm)
    pub diameter: f64,
    /// Wall thickness (mm)
    pub wall_thickness: f64,
    /// Unit construction cost (€/m, trench and laying included)
    pub unit_cost: f64,
}

/// PE100 pipe tiers, ascending by diameter.
pub const PIPE_TIERS: [PipeTier; 17] = [
    PipeTier { diameter: 32.0, wall_thickness: 2.0, unit_cost: 71.91 },
    PipeTier { diameter: 63.0, wall_thickness: 3.8, unit_cost: 74.38 },
    PipeTier { diameter: 75.0, wall_thickness: 4.5, unit_cost: 77.45 },
    PipeTier { diameter: 90.0, wall_thickness: 5.4, unit_cost: 80.28 },
    PipeTier { diameter: 110.0, wall_thickness: 6.6, unit_cost: 83.54 },
    PipeTier { diameter: 125.0, wall_thickness: 7.4, unit_cost: 87.27 },
    PipeTier { diameter: 140.0, wall_thickness: 8.3, unit_cost: 91.29 },
    PipeTier { diameter: 160.0, wall_thickness: 9.5, unit_cost: 96.68 },
    PipeTier { diameter: 180.0, wall_thickness: 10.7, unit_cost: 116.89 },
    PipeTier { diameter: 200.0, wall_thickness: 11.9, unit_cost: 134.53 },
    PipeTier { diameter: 225.0, wall_thickness: 13.4, unit_cost: 153.50 },
    PipeTier { diameter: 250.0, wall_thickness: 14.8, unit_cost: 172.77 },
    PipeTier { diameter: 315.0, wall_thickness: 18.7, unit_cost: 217.17 },
    PipeTier { diameter: 400.0, wall_thickness: 23.7, unit_cost: 271.49 },
    PipeTier { diameter: 450.0, wall_thickness: 26.7, unit_cost: 334.66 },
    PipeTier { diameter: 560.0, wall_thickness: 33.2, unit_cost: 424.33 },
    PipeTier { diameter: 630.0, wall_thickness: 37.4, unit_cost: 489.38 },
];

/// One isolation valve tier: nominal diameter and unit cost.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValveTier {
    /// Nominal diameter (mm)
    pub diameter: f64,
    /// Unit cost (€)
    pub cost: f64,
}

/// Isolation valve tiers, ascending by diameter.
pub const VALVE_TIERS: [ValveTier; 16] = [
    ValveTier { diameter: 40.0, cost: 89.29 },
    ValveTier { diameter: 50.0, cost: 100.46 },
    ValveTier { diameter: 65.0, cost: 125.77 },
    ValveTier { diameter: 80.0, cost: 169.88 },
    ValveTier { diameter: 100.0, cost: 210.88 },
    ValveTier { diameter: 125.0, cost: 278.35 },
    ValveTier { diameter: 150.0, cost: 334.97 },
    ValveTier { diameter: 200.0, cost: 650.00 },
    ValveTier { diameter: 250.0, cost: 865.55 },
    ValveTier { diameter: 300.0, cost: 1116.81 },
    ValveTier { diameter: 350.0, cost: 1812.51 },
    ValveTier { diameter: 400.0, cost: 2388.50 },
    ValveTier { diameter: 450.0, cost: 3095.43 },
    ValveTier { diameter: 500.0, cost: 4058.26 },
    ValveTier { diameter: 600.0, cost: 8026.65 },
    ValveTier { diameter: 700.0, cost: 9014.04 },
];

/// One storage tank tier: capacity, cost, and footprint radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TankTier {
    /// Capacity (m³)
    pub capacity: f64,
    /// Construction cost (€)
    pub cost: f64,
    /// Tank radius (m), used by hydraulic probes to derive the tank diameter
    pub radius: f64,
}

/// Storage tank tiers, ascending by capacity.
pub const TANK_TIERS: [TankTier; 5] = [
    TankTier { capacity: 400.0, cost: 240_000.0, radius: 3.56825 },
    TankTier { capacity: 2500.0, cost: 350_000.0, radius: 8.92062 },
    TankTier { capacity: 5000.0, cost: 440_000.0, radius: 12.61566 },
    TankTier { capacity: 10_000.0, cost: 560_000.0, radius: 17.84124 },
    TankTier { capacity: 20_000.0, cost: 760_000.0, radius: 25.231328 },
];

static WALL_THICKNESS_BY_DIAMETER: Lazy<HashMap<u32, f64>> = Lazy::new(|| {
    PIPE_TIERS
        .iter()
        .map(|t| (t.diameter as u32, t.wall_thickness))
        .collect()
});

/// Cheapest pipe unit cost (€/m), used to prune candidates whose shortest
/// path cannot possibly fit the remaining budget.
pub fn min_pipe_unit_cost() -> Euros {
    Euros(PIPE_TIERS[0].unit_cost)
}

/// Nominal diameter (mm) required to carry `flow` at the 1 m/s reference
/// speed: `d = 1000·√(4·Q / (86400·π))` with Q in m³/day.
pub fn required_diameter(flow: CubicMetersPerDay) -> f64 {
    let q = flow.value().abs() / CubicMetersPerDay::SECONDS_PER_DAY;
    (q * 4.0 / std::f64::consts::PI).sqrt() * 1000.0
}

/// Smallest pipe tier whose diameter is at least `required_mm`, or `None`
/// when the requirement exceeds the catalogue.
pub fn pipe_tier_at_least(required_mm: f64) -> Option<&'static PipeTier> {
    PIPE_TIERS.iter().find(|t| t.diameter >= required_mm)
}

/// Pipe tier for a given flow. The required diameter is truncated to whole
/// millimeters before the catalogue lookup, matching the tabulated keys.
pub fn pipe_tier_for_flow(flow: CubicMetersPerDay) -> Option<&'static PipeTier> {
    pipe_tier_at_least(required_diameter(flow).trunc())
}

/// Wall thickness (mm) of the catalogue tier with the given nominal diameter.
pub fn wall_thickness_for(diameter: Millimeters) -> Millimeters {
    Millimeters(
        WALL_THICKNESS_BY_DIAMETER
            .get(&(diameter.value() as u32))
            .copied()
            .unwrap_or(0.0),
    )
}

/// Smallest valve tier whose diameter is at least `required_mm`, or `None`
/// when the requirement exceeds the catalogue.
pub fn valve_tier_at_least(required_mm: f64) -> Option<&'static ValveTier> {
    VALVE_TIERS.iter().find(|t| t.diameter >= required_mm)
}

/// Tank tier for a total daily demand: the smallest tier whose capacity is at
/// least the demand. Demands beyond the largest tier saturate; the second
/// return value is true when that happened.
pub fn tank_tier_for(total_demand: CubicMetersPerDay) -> (&'static TankTier, bool) {
    let demand = total_demand.value();
    match TANK_TIERS.iter().find(|t| t.capacity >= demand) {
        Some(tier) => (tier, false),
        None => (&TANK_TIERS[TANK_TIERS.len() - 1], true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogues_strictly_ascending() {
        assert!(PIPE_TIERS.windows(2).all(|w| w[0].diameter < w[1].diameter));
        assert!(VALVE_TIERS.windows(2).all(|w| w[0].diameter < w[1].diameter));
        assert!(TANK_TIERS.windows(2).all(|w| w[0].capacity < w[1].capacity));
    }

    #[test]
    fn test_required_diameter_reference_flow() {
        // 100 m3/day at the unit-speed reference needs roughly a 39 mm bore.
        let d = required_diameter(CubicMetersPerDay(100.0));
        assert!((d - 38.3).abs() < 1.0, "got {d}");
    }

    #[test]
    fn test_pipe_ceiling_selection() {
        let tier = pipe_tier_for_flow(CubicMetersPerDay(100.0)).unwrap();
        assert_eq!(tier.diameter, 63.0);

        let tier = pipe_tier_at_least(300.0).unwrap();
        assert_eq!(tier.diameter, 315.0);

        // Exact key selects that tier, not the next.
        let tier = pipe_tier_at_least(250.0).unwrap();
        assert_eq!(tier.diameter, 250.0);

        assert!(pipe_tier_at_least(631.0).is_none());
    }

    #[test]
    fn test_valve_ceiling_selection() {
        assert_eq!(valve_tier_at_least(63.0).unwrap().diameter, 65.0);
        assert_eq!(valve_tier_at_least(700.0).unwrap().diameter, 700.0);
        assert!(valve_tier_at_least(701.0).is_none());
    }

    #[test]
    fn test_tank_ceiling_and_clamp() {
        let (tier, exceeded) = tank_tier_for(CubicMetersPerDay(30.0));
        assert_eq!(tier.capacity, 400.0);
        assert!(!exceeded);

        let (tier, exceeded) = tank_tier_for(CubicMetersPerDay(5000.0));
        assert_eq!(tier.capacity, 5000.0);
        assert!(!exceeded);

        let (tier, exceeded) = tank_tier_for(CubicMetersPerDay(25_000.0));
        assert_eq!(tier.capacity, 20_000.0);
        assert!(exceeded);
    }

    #[test]
    fn test_wall_thickness_lookup() {
        assert_eq!(wall_thickness_for(Millimeters(63.0)).value(), 3.8);
        assert_eq!(wall_thickness_for(Millimeters(630.0)).value(), 37.4);
    }
}
