use assert_fs::prelude::*;
use predicates::prelude::*;

use assembly_publicizer::config::Config;
use assembly_publicizer::core::{BatchDriver, Engine, InputOutcome, OutputSpec};

const LIB: &str = r#"{
  "name": "Lib",
  "types": [
    {
      "name": "Inventory",
      "namespace": "Shop",
      "visibility": "not_public",
      "methods": [
        { "name": "get_Count", "access": "private", "return_type": "int32", "body": { "code": [22, 42] } },
        { "name": "Restock", "access": "family", "body": { "code": [42] } },
        { "name": "Draw", "access": "assembly", "attributes": 1024 }
      ],
      "fields": [
        { "name": "count", "access": "private" },
        { "name": "Emptied", "access": "private" }
      ],
      "properties": [ { "name": "Count", "getter": "get_Count" } ],
      "events": [ { "name": "Emptied" } ],
      "nested_types": [
        { "name": "Slot", "visibility": "nested_private",
          "fields": [ { "name": "index", "access": "assembly" } ] }
      ]
    }
  ]
}"#;

fn driver(config: &Config) -> BatchDriver {
    BatchDriver::new(Engine::new(config), config.batch.clone())
}

#[test]
fn publicizes_into_custom_path() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("Lib.json");
    input.write_str(LIB).unwrap();
    let out = temp.child("custom").child("Out.json");
    let spec = OutputSpec::parse(out.path().to_str().unwrap()).unwrap();

    let summary = driver(&Config::default()).run(&[input.to_path_buf()], Some(&spec));

    assert_eq!(summary.exit_code(), 0);
    temp.child("custom").assert(predicate::path::is_dir());
    out.assert(predicate::path::is_file());
    out.assert(predicate::str::contains("not_public").not());
    out.assert(predicate::str::contains("nested_public"));

    let InputOutcome::Publicized(report) = &summary.outcomes[0] else {
        panic!("input failed: {:?}", summary.outcomes[0]);
    };
    assert_eq!(report.rewrite.types, 2);
    assert_eq!(report.rewrite.methods, 3);
    assert_eq!(report.rewrite.fields, 2);
    assert_eq!(report.rewrite.excluded_fields, 1);
    assert_eq!(report.rewrite.getters, 0);
}

#[test]
fn second_run_changes_nothing() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("Lib.json");
    input.write_str(LIB).unwrap();
    let first_out = OutputSpec::directory_only(temp.child("first").path());
    let second_out = OutputSpec::directory_only(temp.child("second").path());

    let first = driver(&Config::default()).run(&[input.to_path_buf()], Some(&first_out));
    let InputOutcome::Publicized(first) = &first.outcomes[0] else {
        panic!("first run failed");
    };

    let second = driver(&Config::default()).run(&[first.output.clone()], Some(&second_out));
    let InputOutcome::Publicized(second) = &second.outcomes[0] else {
        panic!("second run failed");
    };
    assert_eq!(second.rewrite.total(), 0);
    // The event backing field is still guarded on the second pass
    assert_eq!(second.rewrite.excluded_fields, 1);
}

#[test]
fn strip_bodies_empties_code() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("Lib.json");
    input.write_str(LIB).unwrap();
    let mut config = Config::default();
    config.rewrite.strip_bodies = true;
    let spec = OutputSpec::directory_only(temp.path());

    let summary = driver(&config).run(&[input.to_path_buf()], Some(&spec));
    let InputOutcome::Publicized(report) = &summary.outcomes[0] else {
        panic!("input failed");
    };
    assert_eq!(report.stripped_bodies, 2);

    temp.child("Lib_publicized.json")
        .assert(predicate::str::contains("\"code\": []"))
        .assert(predicate::str::contains("\"return_type\": \"int32\""));
}

#[test]
fn batch_isolates_missing_input() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("One.json").write_str(LIB).unwrap();
    temp.child("Three.json").write_str(LIB).unwrap();
    let inputs = vec![
        temp.child("One.json").to_path_buf(),
        temp.child("Two.json").to_path_buf(),
        temp.child("Three.json").to_path_buf(),
    ];
    let spec = OutputSpec::directory_only(temp.child("out").path());

    let summary = driver(&Config::default()).run(&inputs, Some(&spec));

    assert_eq!(summary.failures, 1);
    assert_eq!(summary.exit_code(), 1);
    assert!(matches!(
        &summary.outcomes[1],
        InputOutcome::Failed { exit_code: 30, .. }
    ));
    temp.child("out/One_publicized.json").assert(predicate::path::exists());
    temp.child("out/Two_publicized.json").assert(predicate::path::missing());
    temp.child("out/Three_publicized.json").assert(predicate::path::exists());
}

#[test]
fn unreadable_input_fails_at_read_stage() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("Broken.dll");
    input.write_binary(b"MZ but nothing else").unwrap();

    let summary = driver(&Config::default()).run(&[input.to_path_buf()], None);
    assert_eq!(summary.exit_code(), 40);
}
