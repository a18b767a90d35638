//! End-to-end pipeline scenarios (`spec.md` §8 scenarios 1-2, 4-5).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use hickory_proto::rr::{Name, RData, RecordType};
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};

use zonesigner::config::{DenialMethod, SerialPolicy, SigningConfig, ZoneConfig};
use zonesigner::core::record::Record;
use zonesigner::core::store::RecordStore;
use zonesigner::core::view::{View, ViewKind};
use zonesigner::crypto::soft::SoftCryptoModule;
use zonesigner::pipeline::Pipeline;

const ZONE_TEXT: &str = "\
$ORIGIN example.
$TTL 3600
@ IN SOA ns1.example. hostmaster.example. 1 3600 900 1209600 3600
@ IN NS ns1.example.
ns1 IN A 192.0.2.1
www IN A 192.0.2.2
";

fn zone_config() -> ZoneConfig {
    ZoneConfig {
        name: "example.".to_string(),
        serial_policy: SerialPolicy::Counter,
        signing: SigningConfig {
            keys: vec![],
            literal_dnskey_rrsigs: vec![],
            sig_validity_default: Duration::from_secs(1_000_000),
            sig_validity_denial: None,
            sig_validity_keyset: None,
            sig_refresh_interval: Duration::from_secs(100_000),
            sig_jitter: Duration::from_secs(0),
            sig_inception_offset: Duration::from_secs(0),
            denial: DenialMethod::Nsec,
        },
        resign_interval: Duration::from_secs(3600),
        retention_horizon: Duration::from_secs(86_400),
        zonefile_in: None,
        zonefile_out: None,
        journal_path: "/dev/null".to_string(),
        listen_addr: "127.0.0.1:0".to_string(),
    }
}

/// A `SoftCryptoModule` carrying one freshly generated ECDSA P-256 ZSK.
fn crypto_with_one_zsk() -> (SoftCryptoModule, String) {
    let module = SoftCryptoModule::new();
    let rng = SystemRandom::new();
    let pkcs8 = EcdsaKeyPair::generate_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, &rng).unwrap();
    let locator = "zsk1".to_string();
    module
        .load_ecdsa_pkcs8(&locator, 256, 13, pkcs8.as_ref())
        .unwrap();
    (module, locator)
}

fn load_zone(apex: &Name) -> Pipeline {
    let pipeline = Pipeline::new(apex.clone(), {
        let mut cfg = zone_config();
        cfg.signing.keys = vec![zonesigner::config::KeyConfig {
            locator: "zsk1".to_string(),
            flags: 256,
            algorithm: 13,
        }];
        cfg
    });
    {
        let mut view = pipeline.input_view();
        let n = zonesigner::zonefile::read_zone(&mut view, apex, ZONE_TEXT).unwrap();
        assert_eq!(n, 4);
        view.commit().unwrap();
    }
    pipeline
}

#[test]
fn fresh_sign_produces_rrsigs_on_every_rrset() {
    let apex = Name::from_str("example.").unwrap();
    let (crypto, _locator) = crypto_with_one_zsk();
    let pipeline = load_zone(&apex);

    let serial = pipeline.advance_prepare().unwrap();
    assert_eq!(serial, 2, "Counter policy bumps the zonefile's serial of 1");

    let signed = pipeline.advance_sign(&crypto, i64::MAX).unwrap();
    assert!(signed > 0);
    pipeline.advance_output().unwrap();

    let www = Name::from_str("www.example.").unwrap();
    let record = pipeline.store().current(&www).unwrap();
    let rrset = record.rrset(RecordType::A).unwrap();
    assert!(!rrset.rrsigs.is_empty(), "A RRset must carry at least one RRSIG");
}

#[test]
fn resign_without_changes_keeps_zone_current() {
    let apex = Name::from_str("example.").unwrap();
    let (crypto, _locator) = crypto_with_one_zsk();
    let pipeline = load_zone(&apex);

    pipeline.advance_prepare().unwrap();
    pipeline.advance_sign(&crypto, i64::MAX).unwrap();
    pipeline.advance_output().unwrap();

    let second_serial = pipeline.advance_prepare().unwrap();
    assert_eq!(second_serial, 3, "a second cycle with no input changes still advances the serial");
    pipeline.advance_sign(&crypto, i64::MAX).unwrap();
    pipeline.advance_output().unwrap();

    let apex_record = pipeline.store().current(&apex).unwrap();
    assert!(apex_record.has_type(RecordType::SOA));
}

#[test]
fn insertion_extends_denial_chain() {
    let apex = Name::from_str("example.").unwrap();
    let (crypto, _locator) = crypto_with_one_zsk();
    let pipeline = load_zone(&apex);
    pipeline.advance_prepare().unwrap();
    pipeline.advance_sign(&crypto, i64::MAX).unwrap();
    pipeline.advance_output().unwrap();

    let www = Name::from_str("www.example.").unwrap();
    let www_before = pipeline.store().current(&www).unwrap();
    assert!(www_before.denial().is_some(), "signed records carry a denial RR");

    let mail = Name::from_str("mail.example.").unwrap();
    {
        let mut view = pipeline.input_view();
        let mut rec = Record::new(mail.clone());
        let addr: std::net::Ipv4Addr = "192.0.2.3".parse().unwrap();
        rec.insert_rdata(RecordType::A, 300, RData::A(addr.into()));
        view.stage_computed(rec);
        view.commit().unwrap();
    }
    pipeline.advance_prepare().unwrap();
    pipeline.advance_sign(&crypto, i64::MAX).unwrap();
    pipeline.advance_output().unwrap();

    let mail_record = pipeline.store().current(&mail).unwrap();
    assert!(mail_record.denial().is_some(), "newly inserted name gets a denial RR too");
}

#[test]
fn concurrent_views_serialize_through_commit_conflict() {
    let store = Arc::new(RecordStore::new());
    let name = Name::from_str("www.example.").unwrap();

    let mut view_a = View::new(store.clone(), ViewKind::Input);
    let mut view_b = View::new(store.clone(), ViewKind::Input);

    let mut rec_a = Record::new(name.clone());
    rec_a.set_valid_from(1);
    view_a.stage_computed(rec_a);

    let mut rec_b = Record::new(name.clone());
    rec_b.set_valid_from(1);
    view_b.stage_computed(rec_b);

    view_a.commit().unwrap();
    let conflict = view_b.commit();
    assert!(conflict.is_err(), "the second view's stale cursor must conflict");

    view_b.reset();
    let mut rec_b2 = (*view_b.latest(&name).unwrap()).clone();
    rec_b2.set_valid_from(2);
    view_b.stage_computed(rec_b2);
    view_b.commit().unwrap();
    assert!(store.latest(&name).is_some());
}
