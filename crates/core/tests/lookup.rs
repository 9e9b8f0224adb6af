use async_trait::async_trait;
use rust_xlsxwriter::{ExcelDateTime, Format, Workbook};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tabulookup_core::{
    AuditLogger, AuditSink, DatasetId, DatasetStore, Filters, LookupError, LookupResult,
    LookupService, MemoryAuditLog, QueryLog, ResultValue, Settings, SheetConfigUpdate,
    TabularReader, FOUND_MESSAGE, NOT_FOUND_MESSAGE,
};
use tabulookup_sheet::{Book, CellValue, Sheet, SheetError};
use tempfile::{tempdir, TempDir};

fn filters(pairs: &[(&str, &str)]) -> Filters {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

fn sales_sheet() -> Sheet {
    Sheet::from_columns(
        &["category", "product", "total"],
        vec![
            vec![CellValue::from("A"), CellValue::from("P1"), CellValue::Int(100)],
            vec![CellValue::from("B"), CellValue::from("P2"), CellValue::Int(200)],
            vec![CellValue::from("A"), CellValue::from("P3"), CellValue::Int(300)],
        ],
    )
}

fn write_workbook(path: &Path, sales: Sheet) {
    let mut book = Book::new();
    book.add_sheet("Sales", sales).unwrap();
    book.add_sheet(
        "Rates",
        Sheet::from_columns(
            &["zone", "rate"],
            vec![vec![CellValue::from("N"), CellValue::Float(1.5)]],
        ),
    )
    .unwrap();
    book.save_as_xlsx(path).unwrap();
}

async fn registered(service: &LookupService) -> (TempDir, tabulookup_core::DatasetId) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("prices.xlsx");
    write_workbook(&path, sales_sheet());
    let dataset = service.register("prices", "price list", &path).await.unwrap();
    (dir, dataset.id)
}

async fn configured(service: &LookupService) -> (TempDir, tabulookup_core::DatasetId) {
    let (dir, id) = registered(service).await;
    service
        .set_sheet_config(
            id,
            "Sales",
            SheetConfigUpdate::new(true)
                .with_filters(["category"])
                .with_results(["total"]),
        )
        .await
        .unwrap();
    (dir, id)
}

#[tokio::test]
async fn test_sales_scenario() {
    let service = LookupService::in_memory();
    let (_dir, id) = configured(&service).await;

    let hit = service
        .query(id, "Sales", &filters(&[("category", "A")]), None)
        .await
        .unwrap();
    assert!(hit.found);
    assert_eq!(hit.message, FOUND_MESSAGE);
    let results = hit.results.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results["total"], ResultValue::Float(100.0));

    let miss = service
        .query(id, "Sales", &filters(&[("category", "C")]), None)
        .await
        .unwrap();
    assert!(!miss.found);
    assert!(miss.results.is_none());
    assert_eq!(miss.message, NOT_FOUND_MESSAGE);
}

#[tokio::test]
async fn test_first_row_wins_on_ties() {
    let service = LookupService::in_memory();
    let (_dir, id) = registered(&service).await;
    service
        .set_sheet_config(
            id,
            "Sales",
            SheetConfigUpdate::new(true)
                .with_filters(["category"])
                .with_results(["product"]),
        )
        .await
        .unwrap();

    let response = service
        .query(id, "Sales", &filters(&[("category", "A")]), None)
        .await
        .unwrap();
    let results = response.results.unwrap();
    assert_eq!(results["product"], ResultValue::String("P1".into()));
    assert_eq!(results["total"], ResultValue::Float(100.0));
}

#[tokio::test]
async fn test_disabled_sheet_rejects_queries() {
    let service = LookupService::in_memory();
    let (_dir, id) = configured(&service).await;

    service
        .set_sheet_config(id, "Sales", SheetConfigUpdate::new(false).with_filters(["category"]))
        .await
        .unwrap();

    let err = service
        .query(id, "Sales", &filters(&[("category", "A")]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LookupError::SheetDisabled(sheet) if sheet == "Sales"));

    let err = service.filterable_columns(id, "Sales").await.unwrap_err();
    assert!(matches!(err, LookupError::SheetDisabled(_)));

    let sheets = service.list_enabled_sheets(id).await.unwrap();
    assert_eq!(sheets.sheets, vec!["Rates"]);
    assert_eq!(sheets.dataset_name, "prices");
}

#[tokio::test]
async fn test_numeric_cell_matches_string_filter() {
    let service = LookupService::in_memory();
    let (_dir, id) = registered(&service).await;
    service
        .set_sheet_config(
            id,
            "Sales",
            SheetConfigUpdate::new(true)
                .with_filters(["total"])
                .with_results(["product"]),
        )
        .await
        .unwrap();

    let response = service
        .query(id, "Sales", &filters(&[("total", "100")]), None)
        .await
        .unwrap();
    assert!(response.found);
    assert_eq!(
        response.results.unwrap()["product"],
        ResultValue::String("P1".into())
    );
}

#[tokio::test]
async fn test_total_is_pinned_first() {
    let service = LookupService::in_memory();
    let (_dir, id) = registered(&service).await;

    service
        .set_sheet_config(
            id,
            "Sales",
            SheetConfigUpdate::new(true).with_results(["product", "total"]),
        )
        .await
        .unwrap();
    let config = service.sheet_config(id, "Sales").await.unwrap();
    assert_eq!(config.result_columns, vec!["total", "product"]);

    service
        .set_sheet_config(id, "Sales", SheetConfigUpdate::new(true).with_results(["product"]))
        .await
        .unwrap();
    let config = service.sheet_config(id, "Sales").await.unwrap();
    assert_eq!(config.result_columns, vec!["total", "product"]);

    let response = service.query(id, "Sales", &Filters::new(), None).await.unwrap();
    let keys: Vec<&String> = response.results.as_ref().unwrap().keys().collect();
    assert_eq!(keys, vec!["total", "product"]);
}

#[tokio::test]
async fn test_config_round_trip() {
    let service = LookupService::in_memory();
    let (_dir, id) = registered(&service).await;

    service
        .set_sheet_config(
            id,
            "Sales",
            SheetConfigUpdate::new(true)
                .with_filters(["category", "missing", "product"])
                .with_results(["nope", "product"]),
        )
        .await
        .unwrap();

    let first = service.filterable_columns(id, "Sales").await.unwrap();
    let keys: Vec<&String> = first.columns.keys().collect();
    assert_eq!(keys, vec!["category", "product"]);
    assert_eq!(first.columns["category"], vec!["A", "B"]);
    assert_eq!(first.columns["product"], vec!["P1", "P2", "P3"]);
    assert_eq!(first.result_columns, vec!["total", "product"]);

    // Writing back what was read changes nothing
    service
        .set_sheet_config(
            id,
            "Sales",
            SheetConfigUpdate::new(true)
                .with_filters(first.columns.keys().cloned())
                .with_results(first.result_columns.clone()),
        )
        .await
        .unwrap();
    let second = service.filterable_columns(id, "Sales").await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_every_query_is_audited_once() {
    let service = LookupService::in_memory();
    let (_dir, id) = configured(&service).await;

    service
        .query(
            id,
            "Sales",
            &filters(&[("category", "A"), ("product", ""), ("ghost", "x")]),
            Some("alice"),
        )
        .await
        .unwrap();
    service
        .query(id, "Sales", &filters(&[("category", "Z")]), None)
        .await
        .unwrap();

    let logs = service.recent_queries(100).await.unwrap();
    assert_eq!(logs.len(), 2);

    let miss = &logs[0];
    assert!(!miss.result_found);
    assert_eq!(miss.result_data, None);

    let hit = &logs[1];
    assert!(hit.result_found);
    assert_eq!(hit.filters_applied, filters(&[("category", "A")]));
    assert_eq!(hit.user.as_deref(), Some("alice"));

    let summary = service.analytics().await.unwrap();
    assert_eq!(summary.total_queries, 2);
    assert_eq!(summary.successful_queries, 1);
    assert!((summary.success_rate - 50.0).abs() < 1e-9);
    assert_eq!(summary.popular_datasets[0].query_count, 2);
}

#[tokio::test]
async fn test_inactive_dataset() {
    let service = LookupService::in_memory();
    let (_dir, id) = configured(&service).await;

    let dataset = service.toggle_active(id).await.unwrap();
    assert!(!dataset.active);

    assert!(matches!(
        service.list_enabled_sheets(id).await,
        Err(LookupError::DatasetInactive(_))
    ));
    assert!(matches!(
        service.query(id, "Sales", &Filters::new(), None).await,
        Err(LookupError::DatasetInactive(_))
    ));

    service.set_active(id, true).await.unwrap();
    assert!(service.query(id, "Sales", &Filters::new(), None).await.is_ok());
}

#[tokio::test]
async fn test_unknown_sheet_and_dataset() {
    let service = LookupService::in_memory();
    let (_dir, id) = configured(&service).await;

    assert!(matches!(
        service.query(id, "Missing", &Filters::new(), None).await,
        Err(LookupError::SheetNotFound(_))
    ));
    assert!(matches!(
        service
            .list_enabled_sheets(tabulookup_core::DatasetId::new())
            .await,
        Err(LookupError::DatasetNotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_config_writes_are_not_lost() {
    let service = LookupService::in_memory();
    let (_dir, id) = registered(&service).await;
    // Derive column metadata up front so every writer takes the same path
    service.sheet_config(id, "Rates").await.unwrap();
    service.sheet_config(id, "Sales").await.unwrap();
    let before = service.dataset(id).await.unwrap().version;

    let mut tasks = Vec::new();
    for round in 0..10 {
        for (sheet, column) in [("Sales", "category"), ("Rates", "zone")] {
            let service = service.clone();
            tasks.push(tokio::spawn(async move {
                let update = SheetConfigUpdate::new(round % 2 == 0).with_filters([column]);
                service.set_sheet_config(id, sheet, update).await.unwrap();
            }));
        }
    }
    for task in tasks {
        task.await.unwrap();
    }

    let dataset = service.dataset(id).await.unwrap();
    assert_eq!(dataset.version, before + 20);
    assert_eq!(dataset.sheet_config["Sales"].filter_columns, vec!["category"]);
    assert_eq!(dataset.sheet_config["Rates"].filter_columns, vec!["zone"]);
}

#[tokio::test]
async fn test_register_validation() {
    let service = LookupService::in_memory();
    let (dir, _id) = registered(&service).await;

    let duplicate = service
        .register("prices", "", dir.path().join("prices.xlsx"))
        .await
        .unwrap_err();
    assert!(matches!(duplicate, LookupError::DuplicateName(_)));

    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, "hello").unwrap();
    let unsupported = service.register("notes", "", &notes).await.unwrap_err();
    assert!(matches!(unsupported, LookupError::UnsupportedFormat(ext) if ext == "txt"));

    let broken = dir.path().join("broken.xlsx");
    std::fs::write(&broken, "not a workbook").unwrap();
    let unreadable = service.register("broken", "", &broken).await.unwrap_err();
    assert!(matches!(unreadable, LookupError::SourceUnreadable { .. }));
    assert_eq!(service.datasets().await.len(), 1);
}

#[tokio::test]
async fn test_register_size_limit() {
    let settings = Settings {
        max_upload_bytes: 16,
        ..Settings::default()
    };
    let service = LookupService::with_parts(settings, DatasetStore::new(), AuditLogger::in_memory());
    let dir = tempdir().unwrap();
    let path = dir.path().join("big.csv");
    std::fs::write(&path, "zone,total\nnorth,1\nsouth,2\n").unwrap();

    let err = service.register("big", "", &path).await.unwrap_err();
    assert!(matches!(err, LookupError::FileTooLarge { max: 16, .. }));
}

#[tokio::test]
async fn test_csv_dataset() {
    let service = LookupService::in_memory();
    let dir = tempdir().unwrap();
    let path = dir.path().join("rates.csv");
    std::fs::write(&path, "zone,total\nnorth,1.25\nsouth,2\n").unwrap();

    let dataset = service.register("rates", "", &path).await.unwrap();
    assert_eq!(dataset.sheet_names, vec!["rates"]);

    let response = service
        .query(dataset.id, "rates", &filters(&[("zone", "south")]), None)
        .await
        .unwrap();
    assert_eq!(response.results.unwrap()["total"], ResultValue::Float(2.0));
}

#[tokio::test]
async fn test_row_cache_invalidated_on_replace() {
    let service = LookupService::with_parts(
        Settings::default(),
        DatasetStore::new().with_row_cache(),
        AuditLogger::in_memory(),
    );
    let (dir, id) = configured(&service).await;
    let query = filters(&[("category", "B")]);

    let before = service.query(id, "Sales", &query, None).await.unwrap();
    assert_eq!(before.results.unwrap()["total"], ResultValue::Float(200.0));
    assert_eq!(service.store().row_cache().unwrap().len().await, 1);

    let updated = dir.path().join("prices_v2.xlsx");
    write_workbook(
        &updated,
        Sheet::from_columns(
            &["category", "product", "total"],
            vec![vec![CellValue::from("B"), CellValue::from("P2"), CellValue::Int(250)]],
        ),
    );
    let dataset = service.replace_source(id, &updated).await.unwrap();
    assert_eq!(dataset.source, updated);
    assert!(service.store().row_cache().unwrap().is_empty().await);

    let after = service.query(id, "Sales", &query, None).await.unwrap();
    assert_eq!(after.results.unwrap()["total"], ResultValue::Float(250.0));
    // Configuration survives the new file
    let config = service.sheet_config(id, "Sales").await.unwrap();
    assert_eq!(config.filter_columns, vec!["category"]);
}

#[tokio::test]
async fn test_delete_cascades_to_audit() {
    let service = LookupService::in_memory();
    let (_dir, id) = configured(&service).await;
    service
        .query(id, "Sales", &filters(&[("category", "A")]), None)
        .await
        .unwrap();

    let removed = service.delete(id, false).await.unwrap();
    assert!(removed.source.exists());
    assert!(service.recent_queries(10).await.unwrap().is_empty());
    assert!(matches!(
        service.dataset(id).await,
        Err(LookupError::DatasetNotFound(_))
    ));
}

#[tokio::test]
async fn test_state_survives_restart() {
    let state = tempdir().unwrap();
    let settings = Settings {
        state_dir: Some(state.path().to_path_buf()),
        ..Settings::default()
    };

    let (_data, id) = {
        let service = LookupService::from_settings(settings.clone()).await.unwrap();
        let (data, id) = configured(&service).await;
        service
            .query(id, "Sales", &filters(&[("category", "A")]), None)
            .await
            .unwrap();
        (data, id)
    };

    let service = LookupService::from_settings(settings).await.unwrap();
    let config = service.sheet_config(id, "Sales").await.unwrap();
    assert_eq!(config.filter_columns, vec!["category"]);
    assert_eq!(service.recent_queries(10).await.unwrap().len(), 1);
}

/// Serves a fixed sheet, sleeping before every row read.
struct FixedReader {
    delay: Duration,
}

impl TabularReader for FixedReader {
    fn sheet_names(&self, _path: &Path) -> tabulookup_sheet::Result<Vec<String>> {
        Ok(vec!["Sales".to_string()])
    }

    fn column_names(&self, _path: &Path, _sheet: &str) -> tabulookup_sheet::Result<Vec<String>> {
        Ok(vec!["category".to_string(), "total".to_string()])
    }

    fn read_sheet(&self, _path: &Path, _sheet: &str) -> tabulookup_sheet::Result<Sheet> {
        std::thread::sleep(self.delay);
        Ok(Sheet::from_columns(
            &["category", "total"],
            vec![vec![CellValue::from("A"), CellValue::Int(1)]],
        ))
    }
}

async fn fixed_service(delay: Duration, timeout_ms: u64, audit: AuditLogger) -> (TempDir, LookupService, DatasetId) {
    let settings = Settings {
        query_timeout_ms: timeout_ms,
        ..Settings::default()
    };
    let service = LookupService::with_parts(
        settings,
        DatasetStore::with_reader(Arc::new(FixedReader { delay })),
        audit,
    );
    let dir = tempdir().unwrap();
    let path: PathBuf = dir.path().join("fixed.csv");
    std::fs::write(&path, "category,total\nA,1\n").unwrap();
    let id = service.register("fixed", "", &path).await.unwrap().id;
    (dir, service, id)
}

#[tokio::test]
async fn test_query_timeout() {
    let (_dir, service, id) =
        fixed_service(Duration::from_millis(500), 20, AuditLogger::in_memory()).await;

    let err = service
        .query(id, "Sales", &Filters::new(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, LookupError::Timeout(20)));
    assert!(service.recent_queries(10).await.unwrap().is_empty());
}

/// Memory sink that takes a while to accept each entry.
struct SlowAuditLog {
    inner: MemoryAuditLog,
    delay: Duration,
}

#[async_trait]
impl AuditSink for SlowAuditLog {
    async fn append(&self, entry: &QueryLog) -> LookupResult<()> {
        tokio::time::sleep(self.delay).await;
        self.inner.append(entry).await
    }

    async fn entries(&self) -> LookupResult<Vec<QueryLog>> {
        self.inner.entries().await
    }

    async fn purge_dataset(&self, dataset: DatasetId) -> LookupResult<usize> {
        self.inner.purge_dataset(dataset).await
    }
}

#[tokio::test]
async fn test_slow_audit_write_is_not_cut_by_deadline() {
    let sink = SlowAuditLog {
        inner: MemoryAuditLog::new(),
        delay: Duration::from_millis(200),
    };
    let (_dir, service, id) =
        fixed_service(Duration::ZERO, 50, AuditLogger::new(Arc::new(sink))).await;

    let response = service
        .query(id, "Sales", &filters(&[("category", "A")]), Some("ana"))
        .await
        .unwrap();
    assert!(response.found);

    let logs = service.recent_queries(10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].user.as_deref(), Some("ana"));
}

#[tokio::test]
async fn test_integer_cells_from_xlsx_stay_integers() {
    let service = LookupService::in_memory();
    let dir = tempdir().unwrap();
    let path = dir.path().join("stock.xlsx");
    let mut book = Book::new();
    book.add_sheet(
        "Stock",
        Sheet::from_columns(
            &["category", "qty", "weight", "total"],
            vec![vec![
                CellValue::from("A"),
                CellValue::Int(2),
                CellValue::Float(1.25),
                CellValue::Int(100),
            ]],
        ),
    )
    .unwrap();
    book.save_as_xlsx(&path).unwrap();
    let id = service.register("stock", "", &path).await.unwrap().id;
    service
        .set_sheet_config(
            id,
            "Stock",
            SheetConfigUpdate::new(true)
                .with_filters(["category"])
                .with_results(["qty", "weight"]),
        )
        .await
        .unwrap();

    let response = service
        .query(id, "Stock", &filters(&[("category", "A")]), None)
        .await
        .unwrap();
    let results = response.results.unwrap();
    assert_eq!(results["qty"], ResultValue::Int(2));
    assert_eq!(results["weight"], ResultValue::Float(1.25));
    assert_eq!(results["total"], ResultValue::Float(100.0));
    assert_eq!(
        serde_json::to_value(&results).unwrap(),
        json!({"total": 100.0, "qty": 2, "weight": 1.25})
    );

    let hit = service
        .query(id, "Stock", &filters(&[("qty", "2")]), None)
        .await
        .unwrap();
    assert!(hit.found);
}

#[tokio::test]
async fn test_date_cells_use_their_text_form() {
    let service = LookupService::in_memory();
    let dir = tempdir().unwrap();
    let path = dir.path().join("shipments.xlsx");

    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Shipments").unwrap();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    worksheet.write_string(0, 0, "shipped").unwrap();
    worksheet.write_string(0, 1, "carrier").unwrap();
    worksheet.write_string(0, 2, "total").unwrap();
    for (row, (day, carrier, total)) in [(15, "north", 10.0), (16, "south", 20.0)].into_iter().enumerate() {
        let row = row as u32 + 1;
        let date = ExcelDateTime::from_ymd(2024, 1, day).unwrap();
        worksheet.write_datetime_with_format(row, 0, &date, &date_format).unwrap();
        worksheet.write_string(row, 1, carrier).unwrap();
        worksheet.write_number(row, 2, total).unwrap();
    }
    workbook.save(&path).unwrap();

    let id = service.register("shipments", "", &path).await.unwrap().id;
    service
        .set_sheet_config(
            id,
            "Shipments",
            SheetConfigUpdate::new(true)
                .with_filters(["shipped"])
                .with_results(["shipped", "carrier"]),
        )
        .await
        .unwrap();

    let columns = service.filterable_columns(id, "Shipments").await.unwrap();
    assert_eq!(
        columns.columns["shipped"],
        vec!["2024-01-15 00:00:00", "2024-01-16 00:00:00"]
    );

    let response = service
        .query(id, "Shipments", &filters(&[("shipped", "2024-01-16 00:00:00")]), None)
        .await
        .unwrap();
    let results = response.results.unwrap();
    assert_eq!(results["shipped"], ResultValue::String("2024-01-16 00:00:00".into()));
    assert_eq!(results["carrier"], ResultValue::String("south".into()));
}

/// Reader whose first look at a file also makes the registry snapshot
/// unwritable, then reports the file as corrupt.
struct SabotagingReader {
    blocker: PathBuf,
}

impl TabularReader for SabotagingReader {
    fn sheet_names(&self, _path: &Path) -> tabulookup_sheet::Result<Vec<String>> {
        std::fs::create_dir_all(&self.blocker)?;
        Err(SheetError::Workbook("corrupt workbook".to_string()))
    }

    fn column_names(&self, _path: &Path, _sheet: &str) -> tabulookup_sheet::Result<Vec<String>> {
        Err(SheetError::Workbook("corrupt workbook".to_string()))
    }

    fn read_sheet(&self, _path: &Path, _sheet: &str) -> tabulookup_sheet::Result<Sheet> {
        Err(SheetError::Workbook("corrupt workbook".to_string()))
    }
}

#[tokio::test]
async fn test_failed_registration_reports_read_error() {
    let state = tempdir().unwrap();
    let snapshot = state.path().join("datasets.json");
    let reader = SabotagingReader {
        blocker: state.path().join("datasets.json.tmp"),
    };
    let store = DatasetStore::with_reader(Arc::new(reader))
        .persisted(&snapshot)
        .await
        .unwrap();
    let service = LookupService::with_parts(Settings::default(), store, AuditLogger::in_memory());

    let path = state.path().join("broken.xlsx");
    std::fs::write(&path, b"not a workbook").unwrap();

    let err = service.register("broken", "", &path).await.unwrap_err();
    assert!(
        matches!(&err, LookupError::SourceUnreadable { message, .. } if message.contains("corrupt workbook")),
        "unexpected error: {err}"
    );
}
