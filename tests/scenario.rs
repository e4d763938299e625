use ccsim::loss::LossConfig;
use ccsim::net::FlowId;
use ccsim::sim::Time;
use ccsim::tcp::Variant;
use ccsim::{Config, ConfigError, Error, FlowConfig, Report, Simulation};

fn with_loss(probability: f64) -> Config {
    Config {
        loss: LossConfig::bernoulli(probability),
        ..Default::default()
    }
}

fn short(mut config: Config, duration: f64) -> Config {
    config.duration = duration;
    for flow in config.flows.iter_mut() {
        flow.stop = duration;
    }
    config
}

fn run(config: Config) -> Report {
    Simulation::new(config).unwrap().run().unwrap()
}

fn throughput(report: &Report, variant: Variant) -> f64 {
    report
        .flows
        .values()
        .find(|flow| flow.variant == variant)
        .map(|flow| flow.summary.throughput_bps)
        .unwrap()
}

#[test]
fn same_seed_same_snapshot() {
    let snapshot = |seed: u64| {
        let config = Config { seed, ..short(with_loss(0.05), 8.) };
        let mut sim = Simulation::new(config).unwrap();
        sim.run_until(Time::seconds(8)).unwrap();
        serde_json::to_string(&sim.snapshot()).unwrap()
    };
    assert_eq!(snapshot(3), snapshot(3));
    assert_ne!(snapshot(3), snapshot(4));
}

#[test]
fn no_loss_means_no_lost_packets() {
    let report = run(short(with_loss(0.), 6.));
    for flow in report.flows.values() {
        assert_eq!(flow.summary.packets_lost, 0, "{}", flow.variant);
        assert!(flow.summary.packets_delivered > 0, "{}", flow.variant);
    }
}

#[test]
fn certain_loss_delivers_nothing() {
    let report = run(short(with_loss(1.), 6.));
    for flow in report.flows.values() {
        assert_eq!(flow.summary.bytes_delivered, 0, "{}", flow.variant);
        assert!(flow.summary.packets_lost > 0, "{}", flow.variant);
        assert!(flow.summary.timeouts > 0, "{}", flow.variant);
    }
}

#[test]
fn probing_resists_random_loss() {
    let lossy = run(with_loss(0.05));
    let clean = run(with_loss(0.));

    for report in [&lossy, &clean] {
        for flow in report.flows.values() {
            assert!(flow.summary.bytes_delivered > 0, "{}", flow.variant);
        }
        assert!(throughput(report, Variant::Bbr) <= 10e6);
    }

    let drop = |variant| 1. - throughput(&lossy, variant) / throughput(&clean, variant);
    assert!(
        drop(Variant::Bbr) < drop(Variant::Cubic),
        "bbr dropped by {:.2}, cubic by {:.2}",
        drop(Variant::Bbr),
        drop(Variant::Cubic)
    );
}

fn fairness_gap(variant: Variant) -> f64 {
    let flow = FlowConfig { variant, ..Default::default() };
    let config = Config {
        flows: vec![flow.clone(), flow],
        ..short(with_loss(0.), 15.)
    };
    let report = run(config);
    let a = report.flows[&FlowId(1)].summary.throughput_bps;
    let b = report.flows[&FlowId(2)].summary.throughput_bps;
    assert!(a > 0. && b > 0., "{variant}");
    (a - b).abs() / a.max(b)
}

#[test]
fn identical_cubic_flows_share_fairly() {
    let gap = fairness_gap(Variant::Cubic);
    assert!(gap < 0.1, "gap {gap:.3}");
}

#[test]
fn identical_bbr_flows_share_fairly() {
    let gap = fairness_gap(Variant::Bbr);
    assert!(gap < 0.1, "gap {gap:.3}");
}

#[test]
fn bursty_loss_model() {
    let config = Config {
        loss: LossConfig::GilbertElliott { bad_len: 5., good_len: 95., bad_loss: 0.5, good_loss: 0. },
        ..short(Config::default(), 6.)
    };
    let report = run(config);
    for flow in report.flows.values() {
        assert!(flow.summary.packets_delivered > 0, "{}", flow.variant);
    }
    assert!(report.flows.values().any(|flow| flow.summary.packets_lost > 0));
}

#[test]
fn invalid_configuration_is_rejected() {
    let config = Config { bandwidth: 0, ..Default::default() };
    assert!(matches!(
        Simulation::new(config),
        Err(Error::InvalidConfiguration(ConfigError::ZeroBandwidth))
    ));
    let config = Config { flows: vec![], ..Default::default() };
    assert!(matches!(Simulation::new(config), Err(Error::InvalidConfiguration(ConfigError::NoFlows))));
}

#[test]
fn report_is_exported_as_json() {
    let report = run(short(with_loss(0.05), 3.));
    let json: serde_json::Value = serde_json::to_value(&report).unwrap();
    assert_eq!(json["seed"], 1);
    assert_eq!(json["flows"]["1"]["variant"], "cubic");
    assert_eq!(json["flows"]["2"]["variant"], "bbr");
    assert!(json["flows"]["2"]["summary"]["throughput_bps"].as_f64().unwrap() > 0.);
}
