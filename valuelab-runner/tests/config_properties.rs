//! Property tests for configuration handling.

use chrono::NaiveDate;
use proptest::prelude::*;
use valuelab_core::engine::RebalanceFrequency;
use valuelab_runner::{ParamGrid, RunConfig};

fn arb_frequency() -> impl Strategy<Value = RebalanceFrequency> {
    prop_oneof![
        Just(RebalanceFrequency::Monthly),
        Just(RebalanceFrequency::Quarterly)
    ]
}

fn base() -> RunConfig {
    let mut config = RunConfig::default();
    config.data.end_date = NaiveDate::from_ymd_opt(2024, 12, 31);
    config
}

proptest! {
    /// Any in-range top_n validates, and the run ID tracks it.
    #[test]
    fn in_range_top_n_validates(top_n in 1usize..=20, freq in arb_frequency()) {
        let mut config = base();
        config.strategy.top_n = top_n;
        config.strategy.rebalance = freq;
        prop_assert!(config.validate().is_ok());

        let mut other = config.clone();
        other.strategy.top_n = if top_n == 20 { 1 } else { top_n + 1 };
        prop_assert_ne!(config.run_id(), other.run_id());
    }

    #[test]
    fn out_of_range_top_n_rejected(top_n in 21usize..1000) {
        let mut config = base();
        config.strategy.top_n = top_n;
        prop_assert!(config.validate().is_err());
    }

    /// TOML written by the config reads back identically.
    #[test]
    fn toml_round_trip(
        top_n in 1usize..=20,
        rf in -0.05..0.15_f64,
        years in 1u32..=10,
        freq in arb_frequency(),
    ) {
        let mut config = base();
        config.strategy.top_n = top_n;
        config.strategy.risk_free_annual = rf;
        config.strategy.rebalance = freq;
        config.valuation.params.projection_years = years;

        let text = config.to_toml().unwrap();
        prop_assert_eq!(RunConfig::from_toml(&text).unwrap(), config);
    }

    /// Grid configs cover every combination exactly once.
    #[test]
    fn grid_covers_every_combination(
        top_ns in prop::collection::btree_set(1usize..=20, 1..6),
        monthly in any::<bool>(),
    ) {
        let rebalances = if monthly {
            vec![RebalanceFrequency::Monthly]
        } else {
            vec![RebalanceFrequency::Monthly, RebalanceFrequency::Quarterly]
        };
        let grid = ParamGrid {
            top_ns: top_ns.iter().copied().collect(),
            rebalances,
        };
        let configs = grid.generate_configs(&base());

        prop_assert_eq!(configs.len(), grid.size());
        let mut ids: Vec<String> = configs.iter().map(RunConfig::run_id).collect();
        ids.sort();
        ids.dedup();
        prop_assert_eq!(ids.len(), grid.size());
    }
}
