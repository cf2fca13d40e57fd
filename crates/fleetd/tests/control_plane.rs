//! Control plane integration tests.
//!
//! Runs the assembled registry, balancer and autoscaler loops on paused
//! tokio time and observes them through the event bus.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use fleet_core::{
    FleetConfig, FleetEvent, Instance, ManualClock, ScalingAction, ScalingPolicyOverrides,
};
use fleetd::{ControlPlane, ControlPlaneSettings};
use fleetgrid_balancer::{BalancerError, RequestContext};
use fleetgrid_registry::{HealthProbe, Registration, probe_fn};
use tokio::sync::broadcast;

fn test_settings(health_interval: Duration, autoscale_interval: Duration) -> ControlPlaneSettings {
    ControlPlaneSettings {
        health_interval,
        autoscale_interval,
        log_events: false,
        ..ControlPlaneSettings::default()
    }
}

fn instance(id: &str) -> Instance {
    Instance::new(id, "127.0.0.1", 8080)
}

fn counting_probe(healthy: bool, count: Arc<AtomicUsize>) -> HealthProbe {
    probe_fn(move || {
        let count = count.clone();
        async move {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(healthy)
        }
    })
}

fn drain(rx: &mut broadcast::Receiver<FleetEvent>) -> Vec<FleetEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test(start_paused = true)]
async fn failing_probe_removes_instance_from_rotation() {
    let mut plane = ControlPlane::new(test_settings(
        Duration::from_secs(1),
        Duration::from_secs(3600),
    ));
    let probes = Arc::new(AtomicUsize::new(0));
    plane.registry().register_with_probes(
        "api",
        vec![
            Registration::new(instance("a")).with_probe(counting_probe(true, probes.clone())),
            Registration::new(instance("b")).with_probe(counting_probe(false, probes.clone())),
        ],
    );

    let mut rx = plane.events().subscribe();
    plane.start();
    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(probes.load(Ordering::SeqCst), 2);
    let events = drain(&mut rx);
    assert_eq!(
        events,
        vec![FleetEvent::InstanceUnhealthy {
            service: "api".to_string(),
            instance_id: "b".to_string(),
            error_count: 1,
        }]
    );

    let ctx = RequestContext::default();
    for _ in 0..4 {
        let picked = plane.balancer().select_instance("api", &ctx).unwrap();
        assert_eq!(picked.id, "a");
    }

    plane.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn sustained_load_emits_one_scale_up_per_cooldown() {
    let clock = Arc::new(ManualClock::new(1_000));
    let mut plane = ControlPlane::with_clock(
        test_settings(Duration::from_secs(3600), Duration::from_secs(1)),
        clock.clone(),
    );
    plane
        .registry()
        .register_service("api", vec![instance("a"), instance("b")]);
    plane
        .autoscaler()
        .add_scaling_policy(
            "api",
            &ScalingPolicyOverrides {
                max_instances: Some(4),
                ..ScalingPolicyOverrides::default()
            },
        )
        .unwrap();

    let ctx = RequestContext::default();
    for _ in 0..200 {
        plane.balancer().select_instance("api", &ctx).unwrap();
    }

    let mut rx = plane.events().subscribe();
    plane.start();

    // Three autoscaler ticks, all inside the cooldown window.
    tokio::time::sleep(Duration::from_millis(3500)).await;

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    match &events[0] {
        FleetEvent::AutoScaling {
            service,
            action,
            current_instances,
            target_instances,
            ..
        } => {
            assert_eq!(service, "api");
            assert_eq!(*action, ScalingAction::ScaleUp);
            assert_eq!(*current_instances, 2);
            assert_eq!(*target_instances, 3);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(plane.autoscaler().history("api").len(), 1);

    // Past the 300s default cooldown the next tick scales again.
    clock.advance(Duration::from_secs(301));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(plane.autoscaler().history("api").len(), 2);

    plane.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn nothing_runs_after_shutdown() {
    let mut plane = ControlPlane::new(test_settings(
        Duration::from_secs(1),
        Duration::from_secs(1),
    ));
    let probes = Arc::new(AtomicUsize::new(0));
    plane.registry().register_with_probes(
        "api",
        vec![Registration::new(instance("a")).with_probe(counting_probe(true, probes.clone()))],
    );

    plane.start();
    assert!(plane.is_running());
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(probes.load(Ordering::SeqCst), 2);

    plane.shutdown().await;
    assert!(!plane.is_running());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(probes.load(Ordering::SeqCst), 2);
    assert_eq!(
        plane
            .balancer()
            .select_instance("api", &RequestContext::default()),
        Err(BalancerError::ShutDown)
    );
}

#[tokio::test]
async fn shutdown_is_idempotent() {
    let mut plane = ControlPlane::new(ControlPlaneSettings {
        log_events: false,
        ..ControlPlaneSettings::default()
    });
    plane.start();
    plane.shutdown().await;
    plane.shutdown().await;
    assert!(plane.balancer().is_shut_down());
}

#[tokio::test(start_paused = true)]
async fn restart_after_shutdown_serves_again() {
    let mut plane = ControlPlane::new(test_settings(
        Duration::from_secs(1),
        Duration::from_secs(1),
    ));
    let probes = Arc::new(AtomicUsize::new(0));
    plane.registry().register_with_probes(
        "api",
        vec![Registration::new(instance("a")).with_probe(counting_probe(true, probes.clone()))],
    );
    let ctx = RequestContext::default();

    plane.start();
    plane.shutdown().await;
    assert_eq!(
        plane.balancer().select_instance("api", &ctx),
        Err(BalancerError::ShutDown)
    );

    plane.start();
    assert!(plane.is_running());
    assert_eq!(plane.balancer().select_instance("api", &ctx).unwrap().id, "a");

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(probes.load(Ordering::SeqCst), 1);

    plane.shutdown().await;
}

#[test]
fn zero_interval_config_is_rejected_before_start() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "[health]\ninterval = \"0s\"\n").unwrap();
    assert!(FleetConfig::from_file(file.path()).is_err());

    let mut config = FleetConfig::default();
    config.health.interval = "0ms".to_string();
    assert!(ControlPlane::from_config(&config).is_err());
}

#[tokio::test]
async fn builds_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[balancer]
strategy = "least-connections"

[[services]]
name = "api"
instances = [
    {{ id = "a", host = "10.0.0.1", port = 8080 }},
    {{ id = "b", host = "10.0.0.2", port = 8080, current_connections = 5 }},
]

[services.scaling]
min_instances = 2
max_instances = 6
cooldown = "1m"
"#
    )
    .unwrap();

    let config = FleetConfig::from_file(file.path()).unwrap();
    let plane = ControlPlane::from_config(&config).unwrap();

    let picked = plane
        .balancer()
        .select_instance("api", &RequestContext::default())
        .unwrap();
    assert_eq!(picked.id, "a");

    let policy = plane.autoscaler().policy("api").unwrap();
    assert_eq!(policy.min_instances, 2);
    assert_eq!(policy.max_instances, 6);
    assert_eq!(policy.cooldown, Duration::from_secs(60));
}

#[test]
fn rejects_invalid_policy_in_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[[services]]
name = "api"

[services.scaling]
min_instances = 5
max_instances = 2
"#
    )
    .unwrap();

    let err = FleetConfig::from_file(file.path()).unwrap_err();
    assert!(err.to_string().contains("api"));
}
