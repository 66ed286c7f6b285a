//! End-to-end tests: storage engines, resources and policy together.
//!
//! Scenarios that should hold for every engine run against both the
//! filesystem and memory engines.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use odyn_store::policy::{AppPolicy, parse_timestamp};
use odyn_store::{
    Acl, Actor, Connection, Datatype, DenyReason, FsEngine, MemoryEngine, PolicyEngine, PropValue,
    Resource, ResourcePath, Right, StorageEngine, StoreError,
};
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// Shared test setup
// ============================================================================

fn path(s: &str) -> ResourcePath {
    ResourcePath::parse(s).unwrap()
}

fn at(ts: &str) -> DateTime<Utc> {
    parse_timestamp(ts).unwrap()
}

/// Both engines, freshly prepped. The TempDir keeps the fs root alive.
async fn engines() -> (Vec<Arc<dyn StorageEngine>>, TempDir) {
    let dir = TempDir::new().unwrap();
    let engines: Vec<Arc<dyn StorageEngine>> = vec![
        Arc::new(FsEngine::new(dir.path())),
        Arc::new(MemoryEngine::new()),
    ];
    for engine in &engines {
        engine.prep().await.unwrap();
    }
    (engines, dir)
}

/// Leela's user record and her toaster.
async fn populate(conn: &Arc<dyn Connection>) {
    let mut leela = Resource::create(Arc::clone(conn), path("user/Leela"));
    leela.set_resource_acl(Acl::from_json(&json!({ "@self": "*" })).unwrap());
    leela.set_app_policy(
        AppPolicy::from_json(&json!({
            "@all": "location,diagnostics",
            "device/PlanetExpress/Refrigerator": "*",
        }))
        .unwrap(),
    );
    let system = leela.add_property("system", Datatype::Void).unwrap();
    let username = leela.add_child(system, "username", Datatype::String).unwrap();
    leela.set_value(username, "Leela").unwrap();
    let password = leela.add_child(system, "password", Datatype::Password).unwrap();
    leela.set_value(password, "zXdt5d4ug78jige").unwrap();
    leela
        .set_acl(password, Acl::from_json(&json!({ "@self": "s" })).unwrap())
        .unwrap();
    leela.save().await.unwrap();

    let mut toaster = Resource::create(Arc::clone(conn), path("device/Leela/Toaster"));
    toaster.set_owners(vec![path("user/Leela")]);
    toaster.set_resource_acl(
        Acl::from_json(&json!({
            "@self": "*",
            "@owner": "gs",
            "user/doorman": "20150803202208:gs",
            "user/doorman2": ["g", "20150803202208-20150804235959:smcd"],
        }))
        .unwrap(),
    );
    let heat = toaster.add_property("heat", Datatype::Int32).unwrap();
    toaster.set_attribute(heat, ":scope", "diagnostics").unwrap();
    toaster.set_value(heat, 3).unwrap();
    let serial = toaster.add_property("serial", Datatype::String).unwrap();
    toaster.set_attribute(serial, ":scope", "inventory").unwrap();
    toaster.save().await.unwrap();
}

// ============================================================================
// Storage behaviour shared by every engine
// ============================================================================

#[tokio::test]
async fn test_round_trip_on_every_engine() {
    let (engines, _dir) = engines().await;
    for engine in engines {
        let conn = engine.connect().await.unwrap();
        populate(&conn).await;

        let leela = Resource::load(Arc::clone(&conn), path("user/Leela")).await.unwrap();
        let pw = leela.property_at("system.password").unwrap();
        assert_eq!(leela.datatype(pw).unwrap(), Datatype::Password);
        assert_eq!(leela.value(pw).unwrap(), &PropValue::from("zXdt5d4ug78jige"));

        let again = conn.load_resource(&path("user/Leela")).await.unwrap();
        assert_eq!(&again, leela.data(), "{}", engine.name());
    }
}

#[tokio::test]
async fn test_delete_on_every_engine() {
    let (engines, _dir) = engines().await;
    for engine in engines {
        let conn = engine.connect().await.unwrap();
        populate(&conn).await;

        let toaster = Resource::load(Arc::clone(&conn), path("device/Leela/Toaster"))
            .await
            .unwrap();
        toaster.delete().await.unwrap();

        let err = Resource::load(Arc::clone(&conn), path("device/Leela/Toaster"))
            .await
            .unwrap_err();
        assert!(err.is_not_found(), "{}", engine.name());
        assert!(conn.resource_exists(&path("user/Leela")).await.unwrap());
    }
}

#[tokio::test]
async fn test_erase_on_every_engine() {
    let (engines, dir) = engines().await;
    std::fs::write(dir.path().join("operator-notes.txt"), b"keep").unwrap();
    for engine in engines {
        let conn = engine.connect().await.unwrap();
        populate(&conn).await;
        engine.erase().await.unwrap();
        engine.prep().await.unwrap();

        let conn = engine.connect().await.unwrap();
        assert!(!conn.resource_exists(&path("user/Leela")).await.unwrap());
    }
    assert!(dir.path().join("operator-notes.txt").exists());
}

#[tokio::test]
async fn test_load_or_create_then_save_on_every_engine() {
    let (engines, _dir) = engines().await;
    for engine in engines {
        let conn = engine.connect().await.unwrap();
        let p = path("team/PlanetExpress/Crew");

        let mut crew = Resource::load_or_create(Arc::clone(&conn), p.clone()).await.unwrap();
        let size = crew.add_property("size", Datatype::Int64).unwrap();
        crew.set_value(size, 7i64).unwrap();
        crew.save().await.unwrap();

        let mut crew = Resource::load_or_create(Arc::clone(&conn), p).await.unwrap();
        let size = crew.property("size").unwrap();
        assert_eq!(crew.value(size).unwrap().as_i64(), Some(7));
        crew.set_value(size, 8i64).unwrap();
        crew.save().await.unwrap();
        crew.refresh().await.unwrap();
        let size = crew.property("size").unwrap();
        assert_eq!(crew.value(size).unwrap().as_i64(), Some(8));
    }
}

// ============================================================================
// Filesystem specifics
// ============================================================================

#[tokio::test]
async fn test_fs_data_survives_new_engine() {
    let dir = TempDir::new().unwrap();
    {
        let engine = FsEngine::new(dir.path());
        let conn = engine.connect().await.unwrap();
        populate(&conn).await;
        conn.close().await.unwrap();
    }
    let conn = FsEngine::new(dir.path()).connect().await.unwrap();
    let toaster = Resource::load(conn, path("device/Leela/Toaster")).await.unwrap();
    let heat = toaster.property("heat").unwrap();
    assert_eq!(toaster.value(heat).unwrap(), &PropValue::Int(3));
}

#[tokio::test]
async fn test_fs_short_identifier_is_corrupt() {
    let dir = TempDir::new().unwrap();
    let engine = FsEngine::new(dir.path());
    engine.prep().await.unwrap();
    let uuid_dir = engine.data_dir().join("device").join("Bender");
    std::fs::create_dir_all(&uuid_dir).unwrap();
    std::fs::write(uuid_dir.join("__uuid"), b"deadbeef").unwrap();

    let conn = engine.connect().await.unwrap();
    let err = Resource::load_or_create(conn, path("device/Bender")).await.unwrap_err();
    assert!(matches!(err, StoreError::Corrupt(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_fs_concurrent_saves_share_identifier() {
    let dir = TempDir::new().unwrap();
    let engine = Arc::new(FsEngine::new(dir.path()));
    engine.prep().await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..6i64 {
        let engine = Arc::clone(&engine);
        tasks.push(tokio::spawn(async move {
            let conn = engine.connect().await.unwrap();
            let mut res = Resource::create(conn, path("device/PlanetExpress/Ship"));
            let fuel = res.add_property("fuel", Datatype::Int64).unwrap();
            res.set_value(fuel, i).unwrap();
            res.save().await.unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let ids = std::fs::read_dir(engine.data_dir().join("res")).unwrap().count();
    assert_eq!(ids, 1);
    let conn = engine.connect().await.unwrap();
    let ship = Resource::load(conn, path("device/PlanetExpress/Ship")).await.unwrap();
    let fuel = ship.property("fuel").unwrap();
    assert!(matches!(ship.value(fuel).unwrap(), PropValue::Int(0..=5)));
}

// ============================================================================
// Policy
// ============================================================================

#[tokio::test]
async fn test_doorman_grants_over_time() {
    let (engines, _dir) = engines().await;
    for engine in engines {
        let conn = engine.connect().await.unwrap();
        populate(&conn).await;
        let policy = PolicyEngine::new(Arc::clone(&conn));
        let toaster = Resource::load(conn, path("device/Leela/Toaster")).await.unwrap();
        let heat = Some(toaster.property("heat").unwrap());

        let doorman = Actor::new(path("user/doorman"));
        let early = policy
            .evaluate(&doorman, &toaster, heat, Right::Get, at("20150803202207"))
            .await
            .unwrap();
        assert!(!early.is_allowed());
        policy
            .authorize(&doorman, &toaster, heat, Right::Set, at("20150803202208"))
            .await
            .unwrap();

        let doorman2 = Actor::new(path("user/doorman2"));
        let rights = policy
            .effective_rights(&doorman2, &toaster, heat, at("20150804120000"))
            .await
            .unwrap();
        assert_eq!(rights.to_string(), "gsmcd");
        let rights = policy
            .effective_rights(&doorman2, &toaster, heat, at("20150805000000"))
            .await
            .unwrap();
        assert_eq!(rights.to_string(), "g");
    }
}

#[tokio::test]
async fn test_stranger_is_denied() {
    let (engines, _dir) = engines().await;
    let conn = engines[0].connect().await.unwrap();
    populate(&conn).await;
    let policy = PolicyEngine::new(Arc::clone(&conn));
    let leela = Resource::load(conn, path("user/Leela")).await.unwrap();

    let zoidberg = Actor::new(path("user/Zoidberg"));
    let err = policy
        .authorize(&zoidberg, &leela, None, Right::Get, Utc::now())
        .await
        .unwrap_err();
    assert!(err.is_permission_denied());

    let me = Actor::new(path("user/Leela"));
    let pw = Some(leela.property_at("system.password").unwrap());
    let read_pw = policy
        .evaluate(&me, &leela, pw, Right::Get, Utc::now())
        .await
        .unwrap();
    assert_eq!(read_pw.deny_reason(), Some(DenyReason::RightNotGranted));
    let write_pw = policy
        .evaluate(&me, &leela, pw, Right::Set, Utc::now())
        .await
        .unwrap();
    assert!(write_pw.is_allowed());
}

#[tokio::test]
async fn test_app_on_behalf_of_user() {
    let (engines, _dir) = engines().await;
    for engine in engines {
        let conn = engine.connect().await.unwrap();
        populate(&conn).await;
        let policy = PolicyEngine::new(Arc::clone(&conn));
        let toaster = Resource::load(conn, path("device/Leela/Toaster")).await.unwrap();
        let now = Utc::now();

        let slurm = Actor::on_behalf_of(path("user/Leela"), path("app/Slurm"));
        let heat = Some(toaster.property("heat").unwrap());
        let serial = Some(toaster.property("serial").unwrap());

        assert!(
            policy
                .evaluate(&slurm, &toaster, heat, Right::Get, now)
                .await
                .unwrap()
                .is_allowed()
        );
        let d = policy
            .evaluate(&slurm, &toaster, serial, Right::Get, now)
            .await
            .unwrap();
        assert_eq!(d.deny_reason(), Some(DenyReason::ScopeNotGranted));
        let d = policy
            .evaluate(&slurm, &toaster, heat, Right::Delete, now)
            .await
            .unwrap();
        assert_eq!(d.deny_reason(), Some(DenyReason::RightNotGranted));
    }
}
