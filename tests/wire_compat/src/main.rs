fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use fhircast_protocol::{
        FhircastMessage, HubMode, InboundFrame, SubscriptionRequest, SubscriptionResponse,
        TokenResponse, parse_frame,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    fn read_fixture(name: &str) -> String {
        let path = fixtures_dir().join(name);
        fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()))
    }

    fn load_fixture(name: &str) -> serde_json::Value {
        serde_json::from_str(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to parse fixture {name}: {e}"))
    }

    /// Deserializes a fixture, re-serializes it, and compares the JSON values.
    fn roundtrip_test<T>(name: &str)
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  hub:  {fixture}\n  ours: {reserialized}"
        );
    }

    fn classify(name: &str) -> InboundFrame {
        parse_frame(&read_fixture(name))
            .unwrap_or_else(|e| panic!("failed to classify {name}: {e}"))
    }

    // --- Event notifications ---

    #[test]
    fn fixture_patient_open() {
        roundtrip_test::<FhircastMessage>("patient_open.json");

        let InboundFrame::Event(msg) = classify("patient_open.json") else {
            panic!("patient_open.json should be an event");
        };
        assert_eq!(msg.id, "hub-4f1c2a9e");
        assert_eq!(msg.event.topic, "room1");
        let patient = msg.event.resource("patient").unwrap();
        assert_eq!(patient["identifier"][0]["value"], "185444");
    }

    #[test]
    fn fixture_imagingstudy_open() {
        roundtrip_test::<FhircastMessage>("imagingstudy_open.json");

        let InboundFrame::Event(msg) = classify("imagingstudy_open.json") else {
            panic!("imagingstudy_open.json should be an event");
        };
        let keys: Vec<_> = msg.event.context.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, ["patient", "study"]);
        assert!(
            msg.event.resource("study").unwrap()["uid"]
                .as_str()
                .unwrap()
                .starts_with("urn:oid:")
        );
    }

    #[test]
    fn fixture_diagnosticreport_update_mixed_case() {
        roundtrip_test::<FhircastMessage>("diagnosticreport_update.json");

        let InboundFrame::Event(msg) = classify("diagnosticreport_update.json") else {
            panic!("diagnosticreport_update.json should be an event");
        };
        assert_eq!(msg.event.event_name(), "diagnosticreport-update");
        assert_eq!(msg.event.context.len(), 2);
    }

    // --- Channel control frames ---

    #[test]
    fn fixture_heartbeat() {
        roundtrip_test::<FhircastMessage>("heartbeat.json");
        assert_eq!(classify("heartbeat.json"), InboundFrame::Heartbeat);
    }

    #[test]
    fn fixture_acknowledgment() {
        assert_eq!(
            classify("acknowledgment.json"),
            InboundFrame::Acknowledgment {
                mode: "subscribe".into()
            }
        );
    }

    // --- HTTP handshake ---

    #[test]
    fn fixture_subscribe_accepted() {
        let resp: SubscriptionResponse =
            serde_json::from_value(load_fixture("subscribe_accepted.json")).unwrap();
        assert!(resp.channel_endpoint.unwrap().starts_with("wss://hub.example/bind/"));
    }

    #[test]
    fn fixture_token_response() {
        let resp: TokenResponse =
            serde_json::from_value(load_fixture("token_response.json")).unwrap();
        assert_eq!(resp.access_token.as_deref(), Some("i8hweunweunweofiwweoijewiwe"));
        assert_eq!(
            resp.topic.as_deref(),
            Some("fdb2f928-5546-4f52-87a0-0648e9ded065")
        );
        assert_eq!(resp.expires_in, Some(3600));
    }

    #[test]
    fn subscription_request_field_names() {
        let req = SubscriptionRequest::new(
            HubMode::Subscribe,
            "https://viewer.example",
            &["patient-open".into()],
            "room1",
            999,
            "fhircast-client-room1-abcdefghijklmn",
        );
        let value = serde_json::to_value(&req).unwrap();
        let mut keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(
            keys,
            [
                "hub.callback",
                "hub.channel.type",
                "hub.events",
                "hub.lease",
                "hub.mode",
                "hub.topic",
                "subscriber.name",
            ]
        );
        assert_eq!(value["hub.callback"], "https://viewer.example/fhircastCallback");
    }
}
