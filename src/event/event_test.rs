use serde_json::json;
use serde_json::Value;

use super::*;

fn parse_frame(frame: &[u8]) -> Value {
    let text = std::str::from_utf8(frame).unwrap();
    let payload = text
        .strip_prefix("data: ")
        .and_then(|rest| rest.strip_suffix("\n\n"))
        .expect("frame must be `data: <payload>\\n\\n`");
    serde_json::from_str(payload).unwrap()
}

#[test]
fn status_update_frame_should_carry_type_and_statuses() {
    let snapshot =
        StatusSnapshot::from_results(&[ServiceId::ApiServer, ServiceId::Redis], vec![(ServiceId::ApiServer, true)]);
    let frame = StreamEvent::status_update(snapshot).to_frame().unwrap();

    let value = parse_frame(&frame);
    assert_eq!(value["type"], "status-update");
    assert_eq!(value["statuses"]["api-server"]["isUp"], true);
    assert_eq!(value["statuses"]["redis"]["isUp"], false);
}

#[test]
fn log_update_frame_should_carry_service_name_and_raw_content() {
    let frame = StreamEvent::log_update(ServiceId::Postgres, "line1\nline2\n")
        .to_frame()
        .unwrap();

    assert_eq!(
        parse_frame(&frame),
        json!({ "type": "log-update", "serviceName": "postgres", "content": "line1\nline2\n" })
    );
}

#[test]
fn frame_should_be_single_line_even_with_embedded_newlines() {
    let frame = StreamEvent::log_update(ServiceId::Redis, "a\n\nb\r\n")
        .to_frame()
        .unwrap();
    let text = std::str::from_utf8(&frame).unwrap();

    // only the terminator may contain newlines
    assert_eq!(text.matches('\n').count(), 2);
    assert!(text.ends_with("\n\n"));
}

#[test]
fn kind_should_match_wire_discriminator() {
    assert_eq!(
        StreamEvent::status_update(StatusSnapshot::all_down(&[])).kind(),
        "status-update"
    );
    assert_eq!(StreamEvent::log_update(ServiceId::Redis, "").kind(), "log-update");
}
