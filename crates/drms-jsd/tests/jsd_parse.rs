use drms_jsd::parse_jsd;
use drms_types::keyword::{slot_index, RecScope, SlotFlavor, SlotParams};
use drms_types::value::Value;
use drms_types::{time, ValueType};

const MINIMAL_JSD: &str = r#"
Seriesname: t.s
Description: "minimal test series"
Author: "test"
Owner: "test"
Unitsize: 2
Archive: 1
Retention: 60
Tapegroup: 1
PrimeKeys: OBS_TIME

Data: image, variable, int, 2, 4, 4, none, binary, "test image"

Keyword: OBS_TIME, time, ts_eq, record, 1977.01.01_00:00:00_TAI, 0, UTC, "record start time"
Keyword: OBS_TIME_epoch, time, constant, record, 1977.01.01_00:00:00_TAI, 0, UTC, "slot epoch"
Keyword: OBS_TIME_step, double, constant, record, 60.0, %f, second, "slot step"
"#;

#[test]
fn s1_parses_minimal_jsd() {
    let template = parse_jsd(MINIMAL_JSD).expect("parse should succeed");

    assert_eq!(template.name, "t.s");
    assert_eq!(template.unitsize, 2);
    assert_eq!(template.segments.len(), 1);
    assert!(template.segments.contains_key("image"));

    for expected in ["OBS_TIME", "OBS_TIME_epoch", "OBS_TIME_step", "OBS_TIME_index"] {
        assert!(template.keywords.contains_key(expected), "missing keyword {expected}");
    }
    assert_eq!(template.keywords.len(), 4);

    let index_kw = &template.keywords["OBS_TIME_index"];
    assert_eq!(index_kw.recscope, RecScope::Index);
    assert_eq!(index_kw.value_type, ValueType::Long);

    let obs_time = &template.keywords["OBS_TIME"];
    assert_eq!(obs_time.recscope, RecScope::Slotted(SlotFlavor::TimeEqual));

    assert_eq!(template.prime_keys_internal, vec!["OBS_TIME_index".to_string()]);
    assert_eq!(template.prime_keys_external, vec!["OBS_TIME".to_string()]);
}

#[test]
fn s2_slot_index_from_parsed_companions() {
    let template = parse_jsd(MINIMAL_JSD).unwrap();

    let Value::Time(epoch) = &template.keywords["OBS_TIME_epoch"].default else {
        panic!("epoch default is not a Time value");
    };
    let Value::Double(step) = &template.keywords["OBS_TIME_step"].default else {
        panic!("step default is not a Double value");
    };
    let params = SlotParams {
        base: *epoch,
        step: *step,
        round: 0.0,
    };

    let v0 = time::parse_time("1977.01.01_00:00:30_TAI").unwrap();
    let v1 = time::parse_time("1977.01.01_00:01:30_TAI").unwrap();
    let v2 = time::parse_time("1977.01.01_00:00:29_TAI").unwrap();

    assert_eq!(slot_index(v0, params), 0);
    assert_eq!(slot_index(v1, params), 1);
    assert_eq!(slot_index(v2, params), 0);
}

#[test]
fn rejects_slotted_key_not_declared_prime() {
    let jsd = MINIMAL_JSD.replace("PrimeKeys: OBS_TIME\n", "");
    let err = parse_jsd(&jsd).unwrap_err();
    assert!(err.to_string().contains("was not declared prime"));
}

#[test]
fn rejects_per_segment_keyword_without_segments() {
    let jsd = r#"
Seriesname: t.empty
Unitsize: 1
Keyword: QUALITY, int, variable, segment, 0, %d, none, "per-segment quality flag"
"#;
    let err = parse_jsd(jsd).unwrap_err();
    assert!(err.to_string().contains("no segments"));
}
