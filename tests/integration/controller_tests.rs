//! Device controller: edge path, command path, queue ordering.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use relaynode::app::commands::RemoteCommand;
use relaynode::app::controller::{CommandOutcome, EdgeOutcome};
use relaynode::app::events::OutboundEvent;
use relaynode::app::ports::OutboundSource;
use relaynode::drivers::edge::{EdgeChannel, EdgeEvent, drain_from, post_edge};

use crate::mocks::rig;

const DEBOUNCE: Duration = Duration::from_millis(200);

fn drain(source: &dyn OutboundSource) -> Vec<OutboundEvent> {
    std::iter::from_fn(|| source.pop_if_any()).collect()
}

fn status(id: &str, label: &str, state: bool) -> OutboundEvent {
    OutboundEvent::Status {
        device_id: id.into(),
        label: label.into(),
        state,
    }
}

#[test]
fn setup_turns_everything_off_and_reports_each_device() {
    let r = rig(&["Pump", "Light"], DEBOUNCE);
    r.outputs[0].set(true);

    r.controller.setup();

    assert!(r.outputs.iter().all(|o| !o.get()));
    assert_eq!(
        drain(&r.controller),
        vec![status("pump", "Pump", false), status("light", "Light", false)]
    );
}

#[test]
fn edges_toggle_once_per_debounce_window() {
    let r = rig(&["Pump"], DEBOUNCE);
    let c = &r.controller;

    assert_eq!(c.on_edge(0, 1_000), EdgeOutcome::Accepted(true));
    assert!(r.outputs[0].get());
    assert_eq!(c.on_edge(0, 1_050), EdgeOutcome::Debounced);
    assert_eq!(c.on_edge(0, 1_199), EdgeOutcome::Debounced);
    assert_eq!(c.on_edge(0, 1_200), EdgeOutcome::Accepted(false));
    assert!(!r.outputs[0].get());

    assert_eq!(
        drain(c),
        vec![status("pump", "Pump", true), status("pump", "Pump", false)]
    );
}

#[test]
fn first_edge_is_accepted_even_near_boot() {
    let r = rig(&["Pump"], DEBOUNCE);
    assert_eq!(r.controller.on_edge(0, 5), EdgeOutcome::Accepted(true));
}

#[test]
fn spurious_edge_with_input_low_changes_nothing() {
    let r = rig(&["Pump"], DEBOUNCE);
    r.inputs[0].set(false);

    assert_eq!(r.controller.on_edge(0, 1_000), EdgeOutcome::NotPressed);
    assert_eq!(r.controller.state_of("Pump"), Some(false));
    assert_eq!(r.controller.pending(), 0);

    // A rejected edge does not start a debounce window.
    r.inputs[0].set(true);
    assert_eq!(r.controller.on_edge(0, 1_010), EdgeOutcome::Accepted(true));
}

#[test]
fn edge_for_missing_device_is_reported() {
    let r = rig(&["Pump"], DEBOUNCE);
    assert_eq!(r.controller.on_edge(7, 1_000), EdgeOutcome::UnknownDevice);
    assert_eq!(r.controller.pending(), 0);
}

#[test]
fn commands_match_label_or_id_case_insensitively() {
    let r = rig(&["Pump", "Light"], DEBOUNCE);
    let c = &r.controller;

    assert_eq!(c.apply(&RemoteCommand::new("PUMP", true)), CommandOutcome::Applied(true));
    assert_eq!(c.apply(&RemoteCommand::new("light", true)), CommandOutcome::Applied(true));
    assert!(r.outputs[0].get() && r.outputs[1].get());
    assert_eq!(c.describe("pump").as_deref(), Some("Pump on"));
}

#[test]
fn unknown_command_target_queues_nothing() {
    let r = rig(&["Pump"], DEBOUNCE);
    assert_eq!(
        r.controller.apply(&RemoteCommand::new("Heater", true)),
        CommandOutcome::UnknownDevice
    );
    assert_eq!(r.controller.pending(), 0);
}

#[test]
fn commands_bypass_debounce_and_repeat_status() {
    let r = rig(&["Pump"], DEBOUNCE);
    let c = &r.controller;

    assert_eq!(c.on_edge(0, 1_000), EdgeOutcome::Accepted(true));
    // Within the edge's window, but commands are not debounced.
    c.apply(&RemoteCommand::new("Pump", false));
    c.apply(&RemoteCommand::new("Pump", false));

    assert_eq!(
        drain(c),
        vec![
            status("pump", "Pump", true),
            status("pump", "Pump", false),
            status("pump", "Pump", false),
        ]
    );
}

#[test]
fn device_infos_carry_current_state() {
    let r = rig(&["Pump", "Light"], DEBOUNCE);
    r.controller.apply(&RemoteCommand::new("Light", true));

    let infos = r.controller.device_infos();
    assert_eq!(infos.len(), 2);
    assert_eq!(infos[0].label, "Pump");
    assert!(!infos[0].state);
    assert_eq!(infos[1].id, "light");
    assert_eq!(infos[1].device_type, "relay");
    assert!(infos[1].state);
}

#[test]
fn edge_channel_feeds_controller_in_order() {
    let r = rig(&["Pump", "Light"], DEBOUNCE);
    let channel = EdgeChannel::new();
    post_edge(&channel, EdgeEvent { device: 1, at_ms: 100 });
    post_edge(&channel, EdgeEvent { device: 0, at_ms: 110 });
    post_edge(&channel, EdgeEvent { device: 1, at_ms: 150 });

    assert_eq!(drain_from(&channel, &r.controller), 3);
    assert_eq!(
        drain(&r.controller),
        vec![status("light", "Light", true), status("pump", "Pump", true)]
    );
}

#[test]
fn concurrent_edges_and_commands_stay_consistent() {
    let r = rig(&["Pump"], Duration::ZERO);
    let controller = Arc::new(r.controller.clone());

    let edges = {
        let c = Arc::clone(&controller);
        thread::spawn(move || {
            (0..500u64)
                .filter(|t| matches!(c.on_edge(0, *t), EdgeOutcome::Accepted(_)))
                .count()
        })
    };
    let commands = {
        let c = Arc::clone(&controller);
        thread::spawn(move || {
            (0..500)
                .filter(|i| {
                    matches!(
                        c.apply(&RemoteCommand::new("pump", i % 2 == 0)),
                        CommandOutcome::Applied(_)
                    )
                })
                .count()
        })
    };
    let accepted = edges.join().unwrap() + commands.join().unwrap();

    let events = drain(controller.as_ref());
    assert_eq!(events.len(), accepted);

    // The last queued status is the state the device ended in.
    let final_state = controller.state_of("Pump").unwrap();
    assert_eq!(events.last(), Some(&status("pump", "Pump", final_state)));
    assert_eq!(r.outputs[0].get(), final_state);
}
