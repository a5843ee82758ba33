// tests/qra_properties.rs
//
// Property-based tests for the QRA building blocks:
// 1. Distribution percentiles are non-decreasing in p
// 2. Event-tree outcomes partition the input frequency
// 3. Ignition threshold insert/remove restores the table
// 4. A frequency override replaces the computed cut set exactly

use std::sync::Arc;

use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence, RngAlgorithm};

use h2qra::event_tree::{self, conservation_tolerance};
use h2qra::{
    Distribution, EvaluateOptions, FrequencySource, FrequencySpec, IgnitionTable, LeakSize,
    Outcome, QraSession, TabulatedHarm,
};

fn qra_proptest_config() -> ProptestConfig {
    ProptestConfig {
        cases: 64,
        source_file: Some(file!()),
        failure_persistence: Some(Box::new(FileFailurePersistence::WithSource(
            "proptest-regressions",
        ))),
        rng_algorithm: RngAlgorithm::ChaCha,
        ..ProptestConfig::default()
    }
}

/// Valid distributions across all four families.
fn distribution_strategy() -> impl Strategy<Value = Distribution> {
    prop_oneof![
        (-15.0f64..2.0, 0.0f64..3.0).prop_map(|(mu, sigma)| Distribution::LogNormal { mu, sigma }),
        (0.0f64..10.0).prop_map(|value| Distribution::ExpectedValue { value }),
        (0.1f64..20.0, 0.1f64..20.0).prop_map(|(alpha, beta)| Distribution::Beta { alpha, beta }),
        (0.0f64..5.0, 0.0f64..5.0).prop_map(|(a, w)| Distribution::Uniform {
            low: a,
            high: a + w,
        }),
    ]
}

fn leak_size_strategy() -> impl Strategy<Value = LeakSize> {
    prop::sample::select(LeakSize::ALL.to_vec())
}

proptest! {
    #![proptest_config(qra_proptest_config())]

    /// percentile(p1) <= percentile(p2) whenever p1 <= p2.
    #[test]
    fn percentiles_are_monotone(
        dist in distribution_strategy(),
        p1 in 0.001f64..0.999,
        p2 in 0.001f64..0.999,
    ) {
        let (lo, hi) = if p1 <= p2 { (p1, p2) } else { (p2, p1) };
        let a = dist.percentile(lo).unwrap();
        let b = dist.percentile(hi).unwrap();
        let slack = 1e-7 * b.abs().max(1.0);
        prop_assert!(a <= b + slack, "{dist:?}: q({lo})={a} > q({hi})={b}");
    }

    /// Shutdown + jetfire + explosion + no ignition == total, all non-negative.
    #[test]
    fn event_tree_conserves_frequency(
        f in prop_oneof![0.0f64..1.0, 0.0f64..1e-300, Just(5e-324)],
        rate in 0.0f64..100.0,
        p_shutdown in 0.0f64..=1.0,
    ) {
        let table = IgnitionTable::default_hydrogen();
        let out = event_tree::evaluate(f, rate, p_shutdown, &table).unwrap();
        let sum = out.frequencies.sum();
        prop_assert!((sum - f).abs() <= conservation_tolerance(f), "f = {f:e}, sum = {sum:e}");
        for outcome in Outcome::ALL {
            prop_assert!(out.frequencies.get(outcome) >= 0.0);
        }
        let (p_i, p_d) = table.lookup(rate);
        prop_assert_eq!(out.p_immediate, p_i);
        prop_assert_eq!(out.p_delayed, p_d);
    }

    /// Inserting a fresh threshold and removing it again gives back the
    /// original thresholds and probabilities.
    #[test]
    fn ignition_insert_remove_round_trip(t in 0.01f64..50.0) {
        let original = IgnitionTable::default_hydrogen();
        prop_assume!(!original.thresholds().contains(&t));

        let mut table = original.clone();
        table.insert_threshold(t).unwrap();
        prop_assert_eq!(table.bins().len(), original.bins().len() + 1);
        table.remove_threshold(t).unwrap();
        prop_assert_eq!(table.thresholds(), original.thresholds());
        prop_assert_eq!(table.immediate(), original.immediate());
        prop_assert_eq!(table.delayed(), original.delayed());
    }

    /// An override is used verbatim, regardless of the catalogs.
    #[test]
    fn override_is_absolute(size in leak_size_strategy(), value in 0.0f64..1.0) {
        let mut session = QraSession::new();
        session.set_harm_model(Arc::new(TabulatedHarm::uniform(1, 0.3)));
        session.set_frequency(size, FrequencySpec::Overridden(value)).unwrap();

        let result = session.evaluate(EvaluateOptions::default()).unwrap();
        let leak = result.leak(size).unwrap();
        prop_assert_eq!(leak.cut_set.total, value);
        prop_assert_eq!(leak.cut_set.source, FrequencySource::Overridden);
        prop_assert_eq!(leak.event_tree.total_frequency, value);
    }
}
