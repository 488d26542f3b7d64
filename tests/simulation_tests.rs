#[cfg(test)]
mod simulation_tests {
    use rand::rngs::mock::StepRng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;
    use std::time::Duration;

    use sbasim::config::{AddressingConfig, SimulationConfig};
    use sbasim::diagnostics::ReachabilityModel;
    use sbasim::topology::{
        ConnectionKind, ConnectionOptions, HttpProtocol, NfConfigPatch, NfId, NfStatus, NfType,
        Orientation, Position, SubscriberError, TopologyEvent,
    };
    use sbasim::Simulation;

    fn seeded(seed: u64) -> Simulation {
        let config = SimulationConfig {
            seed: Some(seed),
            ..SimulationConfig::default()
        };
        Simulation::new(config).unwrap()
    }

    fn move_to(sim: &mut Simulation, id: &NfId, ip: &str) {
        let patch = NfConfigPatch {
            ip_address: Some(ip.to_string()),
            ..NfConfigPatch::default()
        };
        sim.update_network_function_config(id, patch).unwrap();
    }

    /// Success rate of `trials` independent draws from `source` to `target_ip`
    fn success_rate(sim: &Simulation, source: &NfId, target_ip: &str, trials: usize) -> f64 {
        let model = ReachabilityModel::new(sim.config().reachability.clone());
        let source = sim.store().get_nf(source).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2024);
        let hits = (0..trials)
            .filter(|_| model.is_reachable(sim.store(), source, target_ip, &mut rng))
            .count();
        hits as f64 / trials as f64
    }

    #[test]
    fn test_addresses_stay_unique() {
        let mut sim = seeded(1);
        let types = [NfType::Amf, NfType::Smf, NfType::Upf, NfType::Nrf, NfType::Udm];
        for i in 0..300 {
            sim.create_network_function(types[i % types.len()], None).unwrap();
        }

        let nfs = sim.store().nfs();
        let ips: HashSet<&str> = nfs.iter().map(|nf| nf.ip()).collect();
        let ports: HashSet<u16> = nfs.iter().map(|nf| nf.config.port).collect();
        assert_eq!(ips.len(), 300);
        assert_eq!(ports.len(), 300);

        // 245 hosts per subnet, so the 246th address opens the second subnet
        assert_eq!(nfs[244].ip(), "192.168.1.254");
        assert_eq!(nfs[245].ip(), "192.168.2.10");
    }

    #[test]
    fn test_exhausted_pool_still_allocates() {
        let config = SimulationConfig {
            seed: Some(3),
            addressing: AddressingConfig {
                subnets: vec!["10.0.0".to_string()],
                host_min: 10,
                host_max: 11,
                port_min: 9000,
                port_max: 9001,
            },
            ..SimulationConfig::default()
        };
        let mut sim = Simulation::new(config).unwrap();

        let a = sim.create_network_function(NfType::Amf, None).unwrap();
        let b = sim.create_network_function(NfType::Amf, None).unwrap();
        assert_eq!((a.ip(), a.config.port), ("10.0.0.10", 9000));
        assert_eq!((b.ip(), b.config.port), ("10.0.0.11", 9001));

        let c = sim.create_network_function(NfType::Amf, None).unwrap();
        assert!(["10.0.0.10", "10.0.0.11"].contains(&c.ip()));
        assert!((9000..=9001).contains(&c.config.port));
        assert_eq!(sim.store().nfs().len(), 3);
    }

    #[test]
    fn test_delete_cascades_to_connections_and_buses() {
        let mut sim = seeded(5);
        let a = sim.create_network_function(NfType::Amf, None).unwrap().id;
        let b = sim.create_network_function(NfType::Smf, None).unwrap().id;
        let c = sim.create_network_function(NfType::Pcf, None).unwrap().id;
        sim.connect(&a, &b, ConnectionOptions::default()).unwrap();
        let bus = sim
            .create_bus("SBI", Orientation::Horizontal, Position::new(0.0, 40.0), 600.0)
            .unwrap();
        sim.attach_to_bus(&a, &bus).unwrap();
        sim.attach_to_bus(&c, &bus).unwrap();

        let removed = sim.delete_network_function(&a).unwrap();
        assert_eq!(removed.connections.len(), 1);
        assert_eq!(removed.bus_connections.len(), 1);
        assert_eq!(removed.buses, vec![bus.clone()]);

        assert!(sim.store().connections_for_nf(&a).is_empty());
        assert!(sim
            .store()
            .connections_for_nf(&b)
            .iter()
            .all(|conn| !conn.touches(&a)));
        assert_eq!(sim.store().get_bus(&bus).unwrap().connections, vec![c.clone()]);
        assert!(sim.store().bus_connections_for_nf(&a).is_empty());
        assert!(sim.store().get_nf(&a).is_none());
    }

    #[test]
    fn test_deleted_nf_is_not_resurrected() {
        let mut sim = seeded(6);
        let smf = sim.create_network_function(NfType::Smf, None).unwrap().id;
        sim.advance(Duration::from_secs(4));
        sim.delete_network_function(&smf).unwrap();

        let summary = sim.advance(Duration::from_secs(30));
        assert!(summary.stabilized.is_empty());
        assert!(sim.store().get_nf(&smf).is_none());
        assert!(sim.store().is_empty());
    }

    #[test]
    fn test_stop_before_stable_keeps_it_stopped() {
        let mut sim = seeded(7);
        let upf = sim.create_network_function(NfType::Upf, None).unwrap().id;
        assert_eq!(sim.stop_network_function(&upf), Ok(true));

        sim.advance(Duration::from_secs(10));
        assert_eq!(sim.store().get_nf(&upf).unwrap().status, NfStatus::Stopped);

        assert_eq!(sim.start_network_function(&upf), Ok(true));
        sim.advance(Duration::from_secs(5));
        assert_eq!(sim.store().get_nf(&upf).unwrap().status, NfStatus::Stable);
    }

    #[test]
    fn test_cross_subnet_probes_use_gating_probability() {
        let mut sim = seeded(8);
        let nrf = sim.create_network_function(NfType::Nrf, None).unwrap().id;
        let amf = sim.create_network_function(NfType::Amf, None).unwrap().id;
        move_to(&mut sim, &amf, "192.168.2.10");
        sim.connect(&nrf, &amf, ConnectionOptions::default()).unwrap();
        sim.advance(Duration::from_secs(5));

        let rate = success_rate(&sim, &nrf, "192.168.2.10", 1000);
        assert_eq!(rate, 0.0, "cross-subnet probes must not succeed by default");

        let mut config = SimulationConfig {
            seed: Some(8),
            ..SimulationConfig::default()
        };
        config.reachability.cross_subnet = 0.2;
        let mut gated = Simulation::new(config).unwrap();
        let nrf = gated.create_network_function(NfType::Nrf, None).unwrap().id;
        let amf = gated.create_network_function(NfType::Amf, None).unwrap().id;
        move_to(&mut gated, &amf, "192.168.2.10");
        gated.connect(&nrf, &amf, ConnectionOptions::default()).unwrap();
        gated.advance(Duration::from_secs(5));

        let rate = success_rate(&gated, &nrf, "192.168.2.10", 1000);
        assert!((0.15..=0.25).contains(&rate), "expected ~0.2, got {}", rate);
    }

    #[test]
    fn test_same_subnet_rates() {
        let mut sim = seeded(9);
        let nrf = sim.create_network_function(NfType::Nrf, None).unwrap().id;
        let amf = sim.create_network_function(NfType::Amf, None).unwrap().id;
        sim.advance(Duration::from_secs(11));
        assert!(sim.resolver().connected(&amf, &nrf));

        let connected = success_rate(&sim, &amf, "192.168.1.10", 1000);
        assert!((0.92..=0.98).contains(&connected), "connected rate {}", connected);

        let unknown = success_rate(&sim, &amf, "192.168.1.200", 1000);
        assert!((0.15..=0.25).contains(&unknown), "unknown host rate {}", unknown);
    }

    #[test]
    fn test_auto_connect_is_idempotent() {
        let mut sim = seeded(10);
        let nrf = sim.create_network_function(NfType::Nrf, None).unwrap().id;
        let ausf = sim.create_network_function(NfType::Ausf, None).unwrap().id;
        let amf = sim.create_network_function(NfType::Amf, None).unwrap().id;
        sim.advance(Duration::from_secs(5));

        let first = sim.auto_connect(&amf);
        let second = sim.auto_connect(&amf);
        assert_eq!(first.created.len(), 2);
        assert!(second.created.is_empty());

        // The scheduled attempt finds nothing left to do
        let summary = sim.run_until_idle();
        assert!(summary
            .auto_connects
            .iter()
            .filter(|record| record.nf_id == amf)
            .all(|record| record.outcome.created.is_empty()));

        for target in [&nrf, &ausf] {
            assert_eq!(sim.store().connections_between(&amf, target).len(), 1);
        }
    }

    #[test]
    fn test_end_to_end_nrf_amf() {
        let mut sim = seeded(11);
        let nrf = sim.create_network_function(NfType::Nrf, None).unwrap();
        let amf = sim.create_network_function(NfType::Amf, None).unwrap();
        assert_eq!((nrf.ip(), nrf.config.port), ("192.168.1.10", 8080));
        assert_eq!((amf.ip(), amf.config.port), ("192.168.1.11", 8081));

        sim.advance(Duration::from_secs(5));
        assert!(sim.store().nfs().iter().all(|nf| nf.status == NfStatus::Stable));

        sim.auto_connect(&amf.id);
        let links = sim.store().connections_between(&amf.id, &nrf.id);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].kind, ConnectionKind::Auto);
        assert_eq!(links[0].interface_name, "Nnrf");

        sim.delete_network_function(&nrf.id).unwrap();
        assert!(sim
            .store()
            .connections_for_nf(&amf.id)
            .iter()
            .all(|conn| !conn.touches(&nrf.id)));

        // A pending attempt for AMF still runs cleanly without its peer
        sim.run_until_idle();
        assert!(sim.store().connections_for_nf(&amf.id).is_empty());
    }

    #[test]
    fn test_global_protocol_round_trip() {
        let mut sim = seeded(12);
        for nf_type in [NfType::Amf, NfType::Smf, NfType::Upf] {
            sim.create_network_function(nf_type, None).unwrap();
        }
        let already = sim.create_network_function(NfType::Pcf, None).unwrap().id;
        sim.update_network_function_config(&already, NfConfigPatch::protocol(HttpProtocol::Http1))
            .unwrap();

        assert_eq!(sim.update_global_protocol(HttpProtocol::Http1), 3);
        assert!(sim
            .store()
            .nfs()
            .iter()
            .all(|nf| nf.config.http_protocol == HttpProtocol::Http1));
    }

    #[test]
    fn test_ping_cancel_and_history_cap() {
        let mut config = SimulationConfig::default();
        config.ping.history_limit = 3;
        let mut sim = Simulation::with_rng(config, Box::new(StepRng::new(0, 0))).unwrap();
        let nrf = sim.create_network_function(NfType::Nrf, None).unwrap().id;
        let amf = sim.create_network_function(NfType::Amf, None).unwrap().id;
        sim.advance(Duration::from_secs(5));

        sim.start_ping(&amf, "192.168.1.10", 4).unwrap();
        assert!(sim.is_ping_active(&amf));
        sim.advance(Duration::from_millis(1200));
        let cancelled = sim.cancel_ping(&amf).unwrap();
        assert_eq!(cancelled.elapsed.len(), 2);
        assert!(!sim.is_ping_active(&amf));
        assert!(sim.cancel_ping(&amf).is_none());

        // The completion never fires
        sim.advance(Duration::from_secs(10));
        assert!(sim.ping_history(&amf).is_empty());

        for _ in 0..5 {
            sim.ping_once(&amf, "192.168.1.10", 1).unwrap();
        }
        assert_eq!(sim.ping_history(&amf).len(), 3);
        assert!(sim.clear_ping_history(&amf));
        assert!(sim.ping_history(&amf).is_empty());
        assert!(sim.ping_history(&nrf).is_empty());
    }

    #[test]
    fn test_failing_subscribers_are_isolated() {
        let mut sim = seeded(13);
        let seen = Rc::new(RefCell::new(Vec::new()));

        sim.subscribe(Box::new(
            |_event: &TopologyEvent| -> Result<(), SubscriberError> {
                Err(SubscriberError::from("subscriber broke"))
            },
        ));
        sim.subscribe(Box::new(
            |_event: &TopologyEvent| -> Result<(), SubscriberError> { panic!("subscriber exploded") },
        ));
        let log = Rc::clone(&seen);
        sim.subscribe(Box::new(move |event: &TopologyEvent| {
            log.borrow_mut().push(event.tag());
            Ok(())
        }));

        let amf = sim.create_network_function(NfType::Amf, None).unwrap().id;
        sim.rename_network_function(&amf, "AMF-core").unwrap();
        sim.delete_network_function(&amf).unwrap();
        assert_eq!(*seen.borrow(), vec!["nf-added", "nf-updated", "nf-removed"]);

        seen.borrow_mut().clear();
        sim.create_network_function(NfType::Smf, None).unwrap();
        sim.create_network_function(NfType::Upf, None).unwrap();
        seen.borrow_mut().clear();
        sim.reset();
        assert_eq!(*seen.borrow(), vec!["cleared"]);
    }

    #[test]
    fn test_unsubscribed_callback_is_silent() {
        let mut sim = seeded(14);
        let count = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&count);
        let id = sim.subscribe(Box::new(move |_event: &TopologyEvent| {
            *counter.borrow_mut() += 1;
            Ok(())
        }));

        sim.create_network_function(NfType::Amf, None).unwrap();
        assert!(sim.unsubscribe(id));
        assert!(!sim.unsubscribe(id));
        sim.create_network_function(NfType::Smf, None).unwrap();
        assert_eq!(*count.borrow(), 1);
    }
}
