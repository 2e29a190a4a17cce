//! Unit tests for names and packets

#[cfg(test)]
mod tests {
    use super::super::*;
    use bytes::Bytes;

    #[test]
    fn test_name_creation() {
        let name = Name::from_uri("/test/data/1").unwrap();

        assert_eq!(name.len(), 3);
        assert_eq!(name.components()[0].as_bytes().as_ref(), b"test");
        assert_eq!(name.components()[1].as_bytes().as_ref(), b"data");
        assert_eq!(name.components()[2].as_bytes().as_ref(), b"1");

        assert_eq!(name.to_string(), "/test/data/1");
        assert_eq!(Name::new().to_string(), "/");
    }

    #[test]
    fn test_name_uri_escaping() {
        let name = Name::new()
            .append(NameComponent::new(vec![0x00, 0x01]))
            .append_str("a b")
            .append(NameComponent::new(Vec::<u8>::new()));
        assert_eq!(name.to_uri(), "/%00%01/a%20b/...");

        let parsed = Name::from_uri(&name.to_uri()).unwrap();
        assert_eq!(parsed, name);

        let with_scheme = Name::from_uri("ndn:/localhost/nfd").unwrap();
        assert_eq!(with_scheme.to_uri(), "/localhost/nfd");

        assert!(Name::from_uri("/bad/%zz").is_err());
        assert!(Name::from_uri("/a/..").is_err());
    }

    #[test]
    fn test_name_is_immutable_on_append() {
        let base = Name::from_uri("/localhop/wifidirect").unwrap();
        let longer = base.append_str("192.168.49.1");
        assert_eq!(base.len(), 2);
        assert_eq!(longer.to_uri(), "/localhop/wifidirect/192.168.49.1");
    }

    #[test]
    fn test_name_compare() {
        let name1 = Name::from_uri("/a/b/c").unwrap();
        let name2 = Name::from_uri("/a/b/c").unwrap();
        let name3 = Name::from_uri("/a/b/d").unwrap();
        let name4 = Name::from_uri("/a/b").unwrap();

        assert_eq!(name1, name2);
        assert_ne!(name1, name3);
        assert_ne!(name1, name4);
        assert!(name1 < name3);
        assert!(name4 < name1);

        assert!(name4.is_prefix_of(&name1));
        assert!(!name1.is_prefix_of(&name4));
        assert!(!name3.is_prefix_of(&name1));
        assert!(Name::new().is_prefix_of(&name1));
    }

    #[test]
    fn test_get_from_end() {
        let name = Name::from_uri("/localhop/wifidirect/10.0.0.2/10.0.0.1/probe").unwrap();
        assert_eq!(name.get_from_end(1).unwrap().to_string(), "probe");
        assert_eq!(name.get_from_end(3).unwrap().to_string(), "10.0.0.2");
        assert!(name.get_from_end(6).is_none());
    }

    #[test]
    fn test_segment_components() {
        let zero = NameComponent::from_segment(0);
        assert_eq!(zero.as_bytes().as_ref(), &[0x00, 0x00]);
        assert_eq!(zero.to_segment().unwrap(), 0);

        let big = NameComponent::from_segment(0x0102);
        assert_eq!(big.as_bytes().as_ref(), &[0x00, 0x01, 0x02]);
        assert_eq!(big.to_segment().unwrap(), 0x0102);

        assert!(!NameComponent::from("list").is_segment());
        assert!(NameComponent::from("list").to_segment().is_err());
    }

    #[test]
    fn test_name_wire_format() {
        let name = Name::from_uri("/a/bc").unwrap();
        let wire = name.wire_encode();
        assert_eq!(wire.as_ref(), &[0x07, 0x07, 0x08, 0x01, b'a', 0x08, 0x02, b'b', b'c']);
        assert_eq!(Name::wire_decode(&wire).unwrap(), name);

        // the name claims one more byte than its components use
        let bad = [0x07u8, 0x04, 0x08, 0x01, b'a', 0x00];
        assert!(Name::wire_decode(&bad).is_err());
    }

    #[test]
    fn test_interest_packet() {
        let name = Name::from_uri("/test/interest").unwrap();
        let interest = Interest::new(name.clone())
            .with_can_be_prefix(true)
            .with_must_be_fresh(true)
            .with_nonce(42)
            .with_lifetime(2000)
            .with_child_selector(ChildSelector::Rightmost);

        assert_eq!(interest.name, name);
        assert!(interest.can_be_prefix);
        assert!(interest.must_be_fresh);
        assert_eq!(interest.nonce, 42);
        assert_eq!(interest.lifetime().as_millis(), 2000);
        assert_eq!(interest.child_selector, Some(ChildSelector::Rightmost));
    }

    #[test]
    fn test_nonces_differ() {
        let name = Name::from_uri("/n").unwrap();
        let a = Interest::new(name.clone());
        let b = Interest::new(name);
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn test_data_matching() {
        let interest = Interest::new(Name::from_uri("/localhost/nfd/faces/list").unwrap());
        let data = Data::new(
            Name::from_uri("/localhost/nfd/faces/list/%FD%01/%00%00").unwrap(),
            Bytes::from_static(b"payload"),
        )
        .with_final_block_id(NameComponent::from_segment(0))
        .with_freshness_period(1000);

        assert!(interest.matches_data(&data));
        assert_eq!(data.freshness_period_ms, Some(1000));

        let other = Data::new(Name::from_uri("/localhost/nfd/fib/list").unwrap(), Bytes::new());
        assert!(!interest.matches_data(&other));
    }

    #[test]
    fn test_name_serializes_as_uri() {
        let name = Name::from_uri("/a/b").unwrap();
        assert_eq!(serde_json::to_string(&name).unwrap(), "\"/a/b\"");
        let back: Name = serde_json::from_str("\"/a/b\"").unwrap();
        assert_eq!(back, name);
    }
}
