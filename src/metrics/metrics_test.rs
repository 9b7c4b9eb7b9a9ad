use super::*;

#[test]
fn registered_collectors_are_rendered() {
    register_custom_metrics();
    // Registering again is a no-op
    register_custom_metrics();

    CONFIG_MUTATIONS.with_label_values(&["formal", "publish"]).inc();
    LONG_POLL_RESOLUTIONS.with_label_values(&["timeout"]).inc();
    LONG_POLL_HOLD_MS.observe(12.0);

    let body = render();

    assert!(body.contains("config_mutations_total{kind=\"publish\",variant=\"formal\"}"));
    assert!(body.contains("long_poll_resolutions_total{resolution=\"timeout\"}"));
    assert!(body.contains("long_poll_hold_ms_bucket"));
    assert!(body.contains("long_poll_waiting_sessions"));
}
