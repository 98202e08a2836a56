//! Integration tests for the catalog client against the in-process fake.

use std::fs;

use geoserver_client::{
    CatalogConfig, CatalogError, DefaultValueStrategy, GeoServerClient, Presentation,
    PublicationMode, TimeCacheSettings, TimeDimension,
};
use tempfile::TempDir;
use test_utils::{fake_tiff_bytes, FakeGeoServer, FAKE_PASSWORD, FAKE_USERNAME};

const WS: &str = "electro";
const STORE: &str = "ELECTRO_L_2_RGB_GEOSERVER";

fn client_for(server: &FakeGeoServer) -> GeoServerClient {
    let config = CatalogConfig::new(server.base_url(), FAKE_USERNAME, FAKE_PASSWORD);
    GeoServerClient::new(config).unwrap()
}

/// Write an init directory with one granule and zip it.
fn init_archive(tmp: &TempDir, granule: &str) -> std::path::PathBuf {
    let init = tmp.path().join("init");
    fs::create_dir_all(&init).unwrap();
    fs::write(init.join("indexer.properties"), "TimeAttribute=ingestion").unwrap();
    fs::write(init.join(granule), fake_tiff_bytes(granule)).unwrap();
    assert!(staging::zip_dir(&init).unwrap());
    staging::zip_path(&init)
}

#[tokio::test]
async fn test_create_and_list_workspaces() {
    let server = FakeGeoServer::start().await;
    let client = client_for(&server);

    assert!(client.list_workspaces().await.unwrap().is_empty());

    client.create_workspace(WS).await.unwrap();
    let names: Vec<_> = client
        .list_workspaces()
        .await
        .unwrap()
        .into_iter()
        .map(|w| w.name)
        .collect();
    assert_eq!(names, vec![WS]);
}

#[tokio::test]
async fn test_duplicate_workspace_is_already_exists() {
    let server = FakeGeoServer::start().await;
    let client = client_for(&server);

    client.create_workspace(WS).await.unwrap();
    let err = client.create_workspace(WS).await.unwrap_err();
    assert!(err.is_already_exists(), "unexpected error: {err}");
    assert_eq!(err.status(), Some(409));
}

#[tokio::test]
async fn test_duplicate_workspace_with_legacy_status() {
    let server = FakeGeoServer::start().await;
    server.set_legacy_duplicate_status(true);
    let client = client_for(&server);

    client.create_workspace(WS).await.unwrap();
    let err = client.create_workspace(WS).await.unwrap_err();
    assert!(err.is_already_exists(), "unexpected error: {err}");
    assert_eq!(err.status(), Some(401));
}

#[tokio::test]
async fn test_wrong_credentials_are_unauthorized() {
    let server = FakeGeoServer::start().await;
    let config = CatalogConfig::new(server.base_url(), FAKE_USERNAME, "not-the-password");
    let client = GeoServerClient::new(config).unwrap();

    let err = client.create_workspace(WS).await.unwrap_err();
    assert!(matches!(err, CatalogError::Unauthorized { status: 401, .. }));

    let err = client.list_workspaces().await.unwrap_err();
    assert!(matches!(err, CatalogError::Unauthorized { .. }));
    assert!(server.workspace_names().is_empty());
}

#[tokio::test]
async fn test_list_stores_of_empty_workspace() {
    let server = FakeGeoServer::start().await;
    server.add_workspace(WS);
    let client = client_for(&server);

    assert!(client.list_stores(Some(WS)).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_list_stores_of_missing_workspace_is_not_found() {
    let server = FakeGeoServer::start().await;
    let client = client_for(&server);

    let err = client.list_stores(Some("nowhere")).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_create_store_from_zip_harvests_granule() {
    let server = FakeGeoServer::start().await;
    server.add_workspace(WS);
    let client = client_for(&server);
    let tmp = TempDir::new().unwrap();
    let archive = init_archive(&tmp, "ELECTRO_L_2_RGB_20210719_2030_RGB.tiff");

    client.create_store_from_zip(WS, STORE, &archive).await.unwrap();

    let stores: Vec<_> = client
        .list_stores(Some(WS))
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(stores, vec![STORE]);

    let index = client.list_granules(WS, STORE).await.unwrap();
    assert_eq!(index.len(), 1);
    assert!(index.contains_file("ELECTRO_L_2_RGB_20210719_2030_RGB.tiff"));

    let layers: Vec<_> = client
        .list_layers(None)
        .await
        .unwrap()
        .into_iter()
        .map(|l| l.name)
        .collect();
    assert_eq!(layers, vec![format!("{}:{}", WS, STORE)]);
}

#[tokio::test]
async fn test_create_duplicate_store_is_already_exists() {
    let server = FakeGeoServer::start().await;
    server.add_store(WS, STORE);
    let client = client_for(&server);
    let tmp = TempDir::new().unwrap();
    let archive = init_archive(&tmp, "ELECTRO_L_2_RGB_20210719_2030_RGB.tiff");

    let err = client
        .create_store_from_zip(WS, STORE, &archive)
        .await
        .unwrap_err();
    assert!(err.is_already_exists());
    assert!(client.list_granules(WS, STORE).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_create_store_from_missing_zip() {
    let server = FakeGeoServer::start().await;
    let client = client_for(&server);
    let tmp = TempDir::new().unwrap();

    let err = client
        .create_store_from_zip(WS, STORE, &tmp.path().join("init.zip"))
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::LocalFileMissing { .. }));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_publish_external_adds_granule() {
    let server = FakeGeoServer::start().await;
    server.add_store(WS, STORE);
    let client = client_for(&server);
    let tmp = TempDir::new().unwrap();
    let raster = tmp.path().join("ELECTRO_L_2_RGB_20210719_2100_RGB.tiff");
    fs::write(&raster, fake_tiff_bytes("2100")).unwrap();

    client
        .publish(WS, STORE, &raster, PublicationMode::External)
        .await
        .unwrap();

    let index = client.list_granules(WS, STORE).await.unwrap();
    let id = index
        .find_by_file_name("ELECTRO_L_2_RGB_20210719_2100_RGB.tiff")
        .unwrap();
    assert_eq!(index.location(id), Some(&*raster.to_string_lossy()));
}

#[tokio::test]
async fn test_publish_upload_adds_granule() {
    let server = FakeGeoServer::start().await;
    server.add_store(WS, STORE);
    let client = client_for(&server);
    let tmp = TempDir::new().unwrap();
    let raster = tmp.path().join("granule_2130.tiff");
    fs::write(&raster, fake_tiff_bytes("2130")).unwrap();

    client
        .publish(WS, STORE, &raster, PublicationMode::Upload)
        .await
        .unwrap();

    let index = client.list_granules(WS, STORE).await.unwrap();
    assert_eq!(index.file_names(), vec!["granule_2130.tiff"]);
}

#[tokio::test]
async fn test_publish_missing_external_file() {
    let server = FakeGeoServer::start().await;
    server.add_store(WS, STORE);
    let client = client_for(&server);
    let tmp = TempDir::new().unwrap();

    let err = client
        .publish(
            WS,
            STORE,
            &tmp.path().join("missing.tiff"),
            PublicationMode::External,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, CatalogError::LocalFileMissing { operation: "publish", .. }));
    assert!(server.write_requests().is_empty());
}

#[tokio::test]
async fn test_publish_into_missing_store_is_not_found() {
    let server = FakeGeoServer::start().await;
    server.add_workspace(WS);
    let client = client_for(&server);
    let tmp = TempDir::new().unwrap();
    let raster = tmp.path().join("granule.tiff");
    fs::write(&raster, fake_tiff_bytes("x")).unwrap();

    let err = client
        .publish(WS, STORE, &raster, PublicationMode::External)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_delete_granule() {
    let server = FakeGeoServer::start().await;
    server.add_store(WS, STORE);
    server.add_granule(WS, STORE, "/data/a.tiff");
    server.add_granule(WS, STORE, "/data/b.tiff");
    let client = client_for(&server);

    let index = client.list_granules(WS, STORE).await.unwrap();
    let id = index.find_by_file_name("a.tiff").unwrap().to_string();
    client.delete_granule(WS, STORE, &id).await.unwrap();

    assert_eq!(server.granule_locations(WS, STORE), vec!["/data/b.tiff"]);
    let err = client.delete_granule(WS, STORE, &id).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_delete_store_and_workspace() {
    let server = FakeGeoServer::start().await;
    server.add_store(WS, STORE);
    server.add_store(WS, "OTHER");
    let client = client_for(&server);

    client.delete_store(Some(WS), STORE).await.unwrap();
    assert_eq!(server.store_names(WS), vec!["OTHER"]);

    client.delete_store(None, "OTHER").await.unwrap();
    assert!(server.store_names(WS).is_empty());

    client.delete_workspace(WS).await.unwrap();
    assert!(server.workspace_names().is_empty());
}

#[tokio::test]
async fn test_configure_time_dimension() {
    let server = FakeGeoServer::start().await;
    server.add_store(WS, STORE);
    let client = client_for(&server);

    let dimension = TimeDimension {
        presentation: Presentation::List,
        default_value: DefaultValueStrategy::Maximum,
        ..TimeDimension::default()
    };
    client
        .configure_time_dimension(WS, STORE, &dimension)
        .await
        .unwrap();

    assert_eq!(server.time_dimension_updates(WS, STORE), 1);
    let body = server.time_dimension(WS, STORE).unwrap();
    assert!(body.contains("<presentation>LIST</presentation>"));
    assert!(body.contains("<strategy>MAXIMUM</strategy>"));
}

#[tokio::test]
async fn test_configure_time_cache_uses_layer_id() {
    let server = FakeGeoServer::start().await;
    server.add_store(WS, STORE);
    let client = client_for(&server);

    let layer = client.layer_description(WS, STORE).await.unwrap();
    assert!(!layer.id.is_empty());
    assert_eq!(layer.name.as_deref(), Some("electro:ELECTRO_L_2_RGB_GEOSERVER"));

    let settings = TimeCacheSettings::new("2021-07-19T20:30:00.000Z");
    client
        .configure_time_cache(WS, STORE, &settings)
        .await
        .unwrap();

    assert_eq!(server.time_cache_updates(WS, STORE), 1);
    let body = server.time_cache(WS, STORE).unwrap();
    assert!(body.contains(&format!("<id>{}</id>", layer.id)));
    assert!(body.contains("2021-07-19T20:30:00.000Z"));
}

#[tokio::test]
async fn test_time_cache_for_missing_layer_is_not_found() {
    let server = FakeGeoServer::start().await;
    server.add_workspace(WS);
    let client = client_for(&server);

    let err = client
        .configure_time_cache(WS, STORE, &TimeCacheSettings::new("2021-07-19T20:30:00.000Z"))
        .await
        .unwrap_err();
    assert!(err.is_not_found());
    assert!(server.write_requests().is_empty());
}

#[tokio::test]
async fn test_reset_and_reload() {
    let server = FakeGeoServer::start().await;
    let client = client_for(&server);

    client.reset().await.unwrap();
    client.reload().await.unwrap();

    assert_eq!(server.resets(), 1);
    assert_eq!(server.reloads(), 1);
}

#[tokio::test]
async fn test_unreachable_catalog_is_transport_error() {
    let config = CatalogConfig::new("http://127.0.0.1:1/geoserver", FAKE_USERNAME, FAKE_PASSWORD);
    let client = GeoServerClient::new(config).unwrap();

    let err = client.list_workspaces().await.unwrap_err();
    assert!(matches!(err, CatalogError::Transport { .. }));
}

#[tokio::test]
async fn test_publish_zip_adds_granules() {
    let server = FakeGeoServer::start().await;
    server.add_store(WS, STORE);
    let client = client_for(&server);
    let tmp = TempDir::new().unwrap();
    let archive = init_archive(&tmp, "granule_2200.tiff");

    client
        .publish(WS, STORE, &archive, PublicationMode::Zip)
        .await
        .unwrap();

    let index = client.list_granules(WS, STORE).await.unwrap();
    assert_eq!(index.file_names(), vec!["granule_2200.tiff"]);
}

#[tokio::test]
async fn test_delete_layer_clears_coverage() {
    let server = FakeGeoServer::start().await;
    server.add_store(WS, STORE);
    server.add_granule(WS, STORE, "/data/a.tiff");
    let client = client_for(&server);

    client.delete_layer(WS, STORE).await.unwrap();

    assert!(server.granule_locations(WS, STORE).is_empty());
    let paths: Vec<_> = server.write_requests().into_iter().map(|r| r.path).collect();
    assert_eq!(
        paths,
        vec![format!(
            "/geoserver/rest/workspaces/{ws}/coveragestores/{s}/coverages/{s}.xml",
            ws = WS,
            s = STORE
        )]
    );
}
