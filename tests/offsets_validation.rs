mod common;

use common::failing_catalog::FailingCatalog;
use common::{query, register_table, setup_test_env, values, SERVICE_URL};
use datafusion_pulsar_provider::{
    PulsarOptions, PulsarTableProvider, TopicPartition, TopicStrategy,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
async fn test_batch_direction_rules() -> datafusion::error::Result<()> {
    let (broker, ctx) = setup_test_env();
    broker.create_topic("t", 0)?;

    let err = register_table(&ctx, &broker, "a", &[("topic", "t"), ("startingOffsets", "latest")])
        .unwrap_err();
    assert!(
        err.to_string()
            .contains("starting offset can't be latest for batch queries"),
        "{err}"
    );

    let err = register_table(&ctx, &broker, "b", &[("topic", "t"), ("endingOffsets", "earliest")])
        .unwrap_err();
    assert!(
        err.to_string()
            .contains("ending offset can't be earliest for batch queries"),
        "{err}"
    );

    // Per-topic entries are checked once partitions are known.
    register_table(
        &ctx,
        &broker,
        "c",
        &[("topic", "t"), ("endingOffsets", r#"{"t": "earliest"}"#)],
    )?;
    let err = query(&ctx, "SELECT * FROM c").await.unwrap_err();
    assert!(
        err.to_string().contains(
            "ending offset for persistent://public/default/t can't be earliest for batch queries"
        ),
        "{err}"
    );

    register_table(
        &ctx,
        &broker,
        "d",
        &[("topic", "t"), ("startingOffsets", r#"{"t": "latest"}"#)],
    )?;
    let err = query(&ctx, "SELECT * FROM d").await.unwrap_err();
    assert!(
        err.to_string()
            .contains("starting offset for persistent://public/default/t can't be latest"),
        "{err}"
    );
    Ok(())
}

#[tokio::test]
async fn test_partition_entry_overrides_latest_parent() -> datafusion::error::Result<()> {
    let (broker, ctx) = setup_test_env();
    let topic = broker.create_topic("p", 1)?;
    let ids = broker.produce(&topic, ["0", "1", "2"])?;

    let starting = format!(r#"{{"p": "latest", "p-partition-0": "{}"}}"#, ids[1]);
    register_table(&ctx, &broker, "t", &[("topic", "p"), ("startingOffsets", starting.as_str())])?;
    let results = query(&ctx, "SELECT * FROM t").await?;
    assert_eq!(values(&results), vec!["1", "2"]);
    Ok(())
}

#[tokio::test]
async fn test_stale_latest_entry_is_an_unknown_partition() -> datafusion::error::Result<()> {
    let (broker, ctx) = setup_test_env();
    broker.create_topic("t", 0)?;
    register_table(
        &ctx,
        &broker,
        "t",
        &[("topic", "t"), ("startingOffsets", r#"{"gone": "latest"}"#)],
    )?;

    let err = query(&ctx, "SELECT * FROM t").await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("persistent://public/default/gone"), "{msg}");
    assert!(!msg.contains("can't be latest"), "{msg}");
    Ok(())
}

#[tokio::test]
async fn test_malformed_offsets_are_rejected() -> datafusion::error::Result<()> {
    let (broker, ctx) = setup_test_env();
    broker.create_topic("t", 0)?;

    for raw in ["yesterday", r#"{"t": "1:2:3:4"}"#, r#"{"t": 5}"#, "[]"] {
        let err = register_table(&ctx, &broker, "t", &[("topic", "t"), ("endingOffsets", raw)])
            .unwrap_err();
        assert!(err.to_string().contains("endingOffsets"), "{raw}: {err}");
    }
    Ok(())
}

#[tokio::test]
async fn test_stale_partition_reference() -> datafusion::error::Result<()> {
    let (broker, ctx) = setup_test_env();
    broker.create_topic("p", 2)?;
    register_table(
        &ctx,
        &broker,
        "t",
        &[
            ("topic", "p"),
            ("startingOffsets", r#"{"p-partition-7": "earliest"}"#),
        ],
    )?;

    let err = query(&ctx, "SELECT * FROM t").await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("persistent://public/default/p-partition-7"), "{msg}");
    assert!(msg.contains("startingOffsets"), "{msg}");
    Ok(())
}

#[tokio::test]
async fn test_unknown_explicit_id_fails_at_planning() -> datafusion::error::Result<()> {
    let (broker, ctx) = setup_test_env();
    let topic = broker.create_topic("t", 0)?;
    let ids = broker.produce(&topic, ["0", "1"])?;
    let beyond = format!("{}:{}:-1", ids[1].ledger_id, ids[1].entry_id + 100);
    let ending = format!(r#"{{"t": "{beyond}"}}"#);
    register_table(&ctx, &broker, "t", &[("topic", "t"), ("endingOffsets", ending.as_str())])?;

    let err = query(&ctx, "SELECT * FROM t").await.unwrap_err();
    assert!(err.to_string().contains(&beyond), "{err}");
    Ok(())
}

#[tokio::test]
async fn test_explicit_id_inside_ledger_gap_is_rejected() -> datafusion::error::Result<()> {
    let (broker, ctx) = setup_test_env();
    let topic = broker.create_topic("t", 0)?;
    broker.create_topic("other", 0)?;
    let tp = TopicPartition::unpartitioned(topic.clone());
    let before = broker.produce(&topic, ["0", "1"])?;
    broker.roll_ledger(&tp)?;
    let after = broker.produce(&topic, ["2", "3"])?;

    // Lies between the two ledgers of `t`, but no such message was written.
    let gap = format!("{}:999999:-1", before[0].ledger_id + 1);
    let ending = format!(r#"{{"t": "{gap}"}}"#);
    register_table(&ctx, &broker, "gap", &[("topic", "t"), ("endingOffsets", ending.as_str())])?;
    let err = query(&ctx, "SELECT * FROM gap").await.unwrap_err();
    assert!(err.to_string().contains(&gap), "{err}");

    let ending = format!(r#"{{"t": "{}"}}"#, after[0]);
    register_table(&ctx, &broker, "pinned", &[("topic", "t"), ("endingOffsets", ending.as_str())])?;
    let results = query(&ctx, "SELECT * FROM pinned").await?;
    assert_eq!(values(&results), vec!["0", "1", "2"]);
    Ok(())
}

#[tokio::test]
async fn test_explicit_id_needs_partition_key() -> datafusion::error::Result<()> {
    let (broker, ctx) = setup_test_env();
    let topic = broker.create_topic("p", 2)?;
    let ids = broker.produce(&topic, ["0", "1", "2", "3"])?;

    let parent_keyed = format!(r#"{{"p": "{}"}}"#, ids[0]);
    register_table(
        &ctx,
        &broker,
        "parent",
        &[("topic", "p"), ("startingOffsets", parent_keyed.as_str())],
    )?;
    let err = query(&ctx, "SELECT * FROM parent").await.unwrap_err();
    assert!(err.to_string().contains("keyed by partition name"), "{err}");

    // ids[3] is the second message of partition 1.
    let partition_keyed = format!(
        r#"{{"p": "earliest", "p-partition-1": "{}"}}"#,
        ids[3]
    );
    register_table(
        &ctx,
        &broker,
        "mixed",
        &[("topic", "p"), ("startingOffsets", partition_keyed.as_str())],
    )?;
    let results = query(&ctx, "SELECT * FROM mixed").await?;
    assert_eq!(values(&results), vec!["0", "2", "3"]);
    Ok(())
}

#[tokio::test]
async fn test_fail_on_data_loss() -> datafusion::error::Result<()> {
    let (broker, ctx) = setup_test_env();
    let topic = broker.create_topic("t", 0)?;
    let ids = broker.produce(&topic, ["0", "1", "2", "3", "4"])?;
    broker.trim(&TopicPartition::unpartitioned(topic.clone()), ids[3])?;

    let starting = format!(r#"{{"t": "{}"}}"#, ids[1]);
    register_table(
        &ctx,
        &broker,
        "strict",
        &[("topic", "t"), ("startingOffsets", starting.as_str())],
    )?;
    let err = query(&ctx, "SELECT * FROM strict").await.unwrap_err();
    assert!(err.to_string().contains(&ids[1].to_string()), "{err}");

    register_table(
        &ctx,
        &broker,
        "lenient",
        &[
            ("topic", "t"),
            ("startingOffsets", starting.as_str()),
            ("failOnDataLoss", "false"),
        ],
    )?;
    let results = query(&ctx, "SELECT * FROM lenient").await?;
    assert_eq!(values(&results), vec!["3", "4"]);
    Ok(())
}

#[tokio::test]
async fn test_one_failing_partition_fails_the_scan() -> datafusion::error::Result<()> {
    let (broker, ctx) = setup_test_env();
    let topic = broker.create_topic("p", 3)?;
    broker.produce(&topic, ["0", "1", "2"])?;

    let failing = TopicPartition::new(topic.clone(), Some(1));
    let catalog = Arc::new(FailingCatalog::new(broker.clone(), failing));
    let options = PulsarOptions::new(SERVICE_URL, TopicStrategy::single("p")?);
    let provider = PulsarTableProvider::try_new(options, catalog.clone(), broker.clone())?;
    ctx.register_table("t", Arc::new(provider))?;

    let err = query(&ctx, "SELECT * FROM t").await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("p-partition-1"), "{msg}");
    assert!(msg.contains("connection reset by peer"), "{msg}");
    assert!(catalog.latest_calls.load(Ordering::SeqCst) >= 1);
    Ok(())
}
