//! A [`HealthStore`] over an Apple Health export.
//!
//! `export.xml` is indexed once at open time; route GPX files are parsed on
//! demand, on the blocking pool, and streamed back in batches.

use crate::activity::ActivityType;
use crate::error::StoreError;
use crate::gpx::parse_gpx_points;
use crate::store::{HealthStore, LocationSink, LocationStream, location_channel};
use crate::types::{
    LocationBatch, NativeRoute, NativeSample, NativeWorkout, QueryWindow, SampleKind,
};
use crate::utils::{map_file_reference_to_export, meters_per, seconds_per};
use crate::dlog;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use uuid::Uuid;
use walkdir::WalkDir;

pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Date format used by `export.xml` attributes.
const EXPORT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S %z";
const DISTANCE_STATISTIC_PREFIX: &str = "HKQuantityTypeIdentifierDistance";

#[derive(Debug)]
pub struct ExportStore {
    root: PathBuf,
    workouts: Vec<NativeWorkout>,
    /// Keyed by workout uuid.
    routes: HashMap<Uuid, Vec<NativeRoute>>,
    /// Keyed by route uuid. Routes whose file could not be located are absent.
    route_files: HashMap<Uuid, PathBuf>,
    batch_size: usize,
}

impl ExportStore {
    /// Index `export.xml` under `root`.
    pub fn open(root: &Path, batch_size: usize) -> Result<Self, StoreError> {
        let xml_path = root.join("export.xml");
        let file = File::open(&xml_path)
            .map_err(|e| StoreError::not_found(format!("{}: {e}", xml_path.display())))?;
        let parsed = parse_export(BufReader::new(file))?;

        let mut store = Self {
            root: root.to_path_buf(),
            workouts: Vec::with_capacity(parsed.len()),
            routes: HashMap::new(),
            route_files: HashMap::new(),
            batch_size: batch_size.max(1),
        };

        let mut by_name: Option<HashMap<String, PathBuf>> = None;
        for ParsedWorkout { sample, routes } in parsed {
            let mut native_routes = Vec::with_capacity(routes.len());
            for ParsedRoute { route, file } in routes {
                match file.and_then(|f| store.resolve_route_file(&f, &mut by_name)) {
                    Some(path) => {
                        store.route_files.insert(route.uuid, path);
                    }
                    None => tracing::warn!(route = %route.uuid, "route file not found in export"),
                }
                native_routes.push(route);
            }
            if !native_routes.is_empty() {
                store.routes.insert(sample.uuid, native_routes);
            }
            store.workouts.push(sample);
        }

        tracing::info!(
            root = %store.root.display(),
            workouts = store.workouts.len(),
            routes = store.routes.values().map(Vec::len).sum::<usize>(),
            "export indexed"
        );
        Ok(store)
    }

    pub fn workout_count(&self) -> usize {
        self.workouts.len()
    }

    fn resolve_route_file(
        &self,
        reference: &str,
        by_name: &mut Option<HashMap<String, PathBuf>>,
    ) -> Option<PathBuf> {
        if let Some(path) = map_file_reference_to_export(&self.root, reference)
            && path.is_file()
        {
            return Some(path);
        }

        let name = Path::new(reference).file_name()?.to_str()?;
        let index = by_name.get_or_insert_with(|| index_gpx_files(&self.root));
        index.get(name).cloned()
    }
}

/// File name → path for every `.gpx` under the export.
fn index_gpx_files(root: &Path) -> HashMap<String, PathBuf> {
    let index: HashMap<String, PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .is_some_and(|s| s.eq_ignore_ascii_case("gpx"))
        })
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            Some((name, e.into_path()))
        })
        .collect();
    dlog!("indexed gpx files root={} count={}", root.display(), index.len());
    index
}

#[async_trait]
impl HealthStore for ExportStore {
    fn is_health_data_available(&self) -> bool {
        true
    }

    async fn request_authorization(&self, read: &[SampleKind]) -> Result<bool, StoreError> {
        // An export was produced by its owner; read access is implied.
        dlog!("export authorization kinds={read:?}");
        Ok(true)
    }

    async fn query_workouts(&self, window: &QueryWindow) -> Result<Vec<NativeSample>, StoreError> {
        Ok(self
            .workouts
            .iter()
            .filter(|w| window.overlaps(w.start, w.end))
            .cloned()
            .map(NativeSample::Workout)
            .collect())
    }

    async fn query_routes(&self, workout: &NativeWorkout) -> Result<Vec<NativeRoute>, StoreError> {
        Ok(self.routes.get(&workout.uuid).cloned().unwrap_or_default())
    }

    /// Must be called from within a tokio runtime.
    fn route_locations(&self, route: &NativeRoute) -> LocationStream {
        let (tx, rx) = location_channel();
        let Some(path) = self.route_files.get(&route.uuid).cloned() else {
            let _ = tx.send(Err(StoreError::not_found(format!(
                "no route file for {}",
                route.uuid
            ))));
            return rx;
        };

        let batch_size = self.batch_size;
        tokio::task::spawn_blocking(move || deliver_locations(&path, batch_size, &tx));
        rx
    }
}

fn deliver_locations(path: &Path, batch_size: usize, tx: &LocationSink) {
    let points = match parse_gpx_points(path) {
        Ok(points) => points,
        Err(e) => {
            let _ = tx.send(Err(e));
            return;
        }
    };

    if points.is_empty() {
        let _ = tx.send(Ok(LocationBatch {
            locations: Vec::new(),
            done: true,
        }));
        return;
    }

    let batches = points.len().div_ceil(batch_size);
    for (i, chunk) in points.chunks(batch_size).enumerate() {
        let batch = LocationBatch {
            locations: chunk.to_vec(),
            done: i + 1 == batches,
        };
        if tx.send(Ok(batch)).is_err() {
            dlog!("location receiver dropped path={}", path.display());
            return;
        }
    }
}

#[derive(Debug)]
struct ParsedWorkout {
    sample: NativeWorkout,
    routes: Vec<ParsedRoute>,
}

#[derive(Debug)]
struct ParsedRoute {
    route: NativeRoute,
    file: Option<String>,
}

#[derive(Default)]
struct PendingWorkout {
    activity: String,
    duration: Option<f64>,
    duration_unit: Option<String>,
    total_distance: Option<f64>,
    total_distance_unit: Option<String>,
    statistic_distance: Option<(f64, String)>,
    start: String,
    end: String,
    source: String,
    routes: Vec<PendingRoute>,
}

#[derive(Default)]
struct PendingRoute {
    start: String,
    end: String,
    file: Option<String>,
}

#[derive(Default)]
struct ExportState {
    workout: Option<PendingWorkout>,
    route: Option<PendingRoute>,
    out: Vec<ParsedWorkout>,
    skipped: usize,
}

/// Workouts in document order.
fn parse_export<R: BufRead>(reader: R) -> Result<Vec<ParsedWorkout>, StoreError> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut st = ExportState::default();

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Eof => break,
            Event::Start(e) => handle_start(&mut st, &e),
            Event::Empty(e) => {
                handle_start(&mut st, &e);
                handle_end(&mut st, e.local_name().as_ref());
            }
            Event::End(e) => handle_end(&mut st, e.local_name().as_ref()),
            _ => {}
        }
        buf.clear();
    }

    if st.skipped > 0 {
        tracing::warn!(skipped = st.skipped, "skipped workouts with unreadable dates");
    }
    Ok(st.out)
}

fn handle_start(st: &mut ExportState, e: &BytesStart<'_>) {
    match e.local_name().as_ref() {
        b"Workout" => {
            st.workout = Some(PendingWorkout {
                activity: attr(e, b"workoutActivityType").unwrap_or_default(),
                duration: attr(e, b"duration").and_then(|v| v.parse().ok()),
                duration_unit: attr(e, b"durationUnit"),
                total_distance: attr(e, b"totalDistance").and_then(|v| v.parse().ok()),
                total_distance_unit: attr(e, b"totalDistanceUnit"),
                start: attr(e, b"startDate").unwrap_or_default(),
                end: attr(e, b"endDate").unwrap_or_default(),
                source: attr(e, b"sourceName").unwrap_or_default(),
                ..PendingWorkout::default()
            });
        }
        b"WorkoutStatistics" => {
            let Some(w) = st.workout.as_mut() else {
                return;
            };
            let is_distance = attr(e, b"type").is_some_and(|t| t.starts_with(DISTANCE_STATISTIC_PREFIX));
            if is_distance
                && let Some(sum) = attr(e, b"sum").and_then(|v| v.parse::<f64>().ok())
            {
                let unit = attr(e, b"unit").unwrap_or_else(|| "m".to_string());
                w.statistic_distance = Some((sum, unit));
            }
        }
        b"WorkoutRoute" if st.workout.is_some() => {
            st.route = Some(PendingRoute {
                start: attr(e, b"startDate").unwrap_or_default(),
                end: attr(e, b"endDate").unwrap_or_default(),
                file: None,
            });
        }
        b"FileReference" => {
            if let Some(route) = st.route.as_mut() {
                route.file = attr(e, b"path");
            }
        }
        _ => {}
    }
}

fn handle_end(st: &mut ExportState, name: &[u8]) {
    match name {
        b"WorkoutRoute" => {
            if let (Some(route), Some(w)) = (st.route.take(), st.workout.as_mut()) {
                w.routes.push(route);
            }
        }
        b"Workout" => {
            let Some(pending) = st.workout.take() else {
                return;
            };
            let seq = st.out.len() + st.skipped;
            match finish_workout(pending, seq) {
                Some(parsed) => st.out.push(parsed),
                None => st.skipped += 1,
            }
        }
        _ => {}
    }
}

/// `seq` is the workout's position in the document, so identical twins
/// still get distinct IDs.
fn finish_workout(p: PendingWorkout, seq: usize) -> Option<ParsedWorkout> {
    let start = parse_export_date(&p.start)?;
    let end = parse_export_date(&p.end)?;

    let uuid = Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("workout|{seq}|{}|{}|{}|{}", p.activity, p.start, p.end, p.source).as_bytes(),
    );

    let duration_s = match (p.duration, p.duration_unit.as_deref().unwrap_or("min")) {
        (Some(v), unit) => seconds_per(unit).map(|k| v * k),
        (None, _) => None,
    }
    .unwrap_or_else(|| (end - start).num_milliseconds() as f64 / 1000.0);

    let total_distance_m = p
        .total_distance
        .zip(p.total_distance_unit.or_else(|| Some("km".to_string())))
        .or(p.statistic_distance)
        .and_then(|(v, unit)| meters_per(&unit).map(|k| v * k));

    let routes = p
        .routes
        .into_iter()
        .enumerate()
        .map(|(i, r)| {
            let route_uuid = Uuid::new_v5(
                &Uuid::NAMESPACE_OID,
                format!("route|{uuid}|{i}|{}", r.file.as_deref().unwrap_or_default()).as_bytes(),
            );
            ParsedRoute {
                route: NativeRoute {
                    uuid: route_uuid,
                    start: parse_export_date(&r.start).unwrap_or(start),
                    end: parse_export_date(&r.end).unwrap_or(end),
                },
                file: r.file,
            }
        })
        .collect();

    Some(ParsedWorkout {
        sample: NativeWorkout {
            uuid,
            activity_code: ActivityType::from_identifier(&p.activity).code(),
            start,
            end,
            total_distance_m,
            duration_s,
        },
        routes,
    })
}

fn parse_export_date(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, EXPORT_DATE_FORMAT)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .with_checks(false)
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    const EXPORT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE HealthData [
<!ELEMENT HealthData (ExportDate,Me,(Record|Workout)*)>
]>
<HealthData locale="en_US">
 <ExportDate value="2024-01-02 10:00:00 +0100"/>
 <Record type="HKQuantityTypeIdentifierStepCount" startDate="2019-06-01 08:00:00 +0200" endDate="2019-06-01 08:01:00 +0200" value="12"/>
 <Workout workoutActivityType="HKWorkoutActivityTypeRunning" duration="30" durationUnit="min" totalDistance="5.2" totalDistanceUnit="km" sourceName="Watch" startDate="2019-06-01 09:00:00 +0200" endDate="2019-06-01 09:30:00 +0200">
  <WorkoutEvent type="HKWorkoutEventTypePause" date="2019-06-01 09:10:00 +0200"/>
  <WorkoutRoute sourceName="Watch" startDate="2019-06-01 09:00:01 +0200" endDate="2019-06-01 09:29:59 +0200">
   <MetadataEntry key="HKMetadataKeySyncVersion" value="2"/>
   <FileReference path="/workout-routes/route_2019-06-01_9.00am.gpx"/>
  </WorkoutRoute>
 </Workout>
 <Workout workoutActivityType="HKWorkoutActivityTypeCycling" duration="3600" durationUnit="s" sourceName="Phone" startDate="2020-03-01 10:00:00 +0100" endDate="2020-03-01 11:00:00 +0100">
  <WorkoutStatistics type="HKQuantityTypeIdentifierDistanceCycling" startDate="2020-03-01 10:00:00 +0100" endDate="2020-03-01 11:00:00 +0100" sum="12.5" unit="mi"/>
 </Workout>
 <Workout workoutActivityType="HKWorkoutActivityTypeSwimBikeRun" sourceName="Watch" startDate="2021-01-01 10:00:00 +0000" endDate="2021-01-01 10:45:00 +0000"/>
 <Workout workoutActivityType="HKWorkoutActivityTypeYoga" startDate="yesterday" endDate="today"/>
</HealthData>"#;

    const GPX: &str = r#"<gpx><trk><trkseg>
<trkpt lat="48.0" lon="-4.0"><ele>1</ele><time>2019-06-01T07:00:01Z</time></trkpt>
<trkpt lat="48.1" lon="-4.1"><ele>2</ele><time>2019-06-01T07:00:02Z</time></trkpt>
<trkpt lat="48.2" lon="-4.2"><ele>3</ele><time>2019-06-01T07:00:03Z</time></trkpt>
</trkseg></trk></gpx>"#;

    fn fixture(route_dir: &str) -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("export.xml"), EXPORT).unwrap();
        let dir = tmp.path().join(route_dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("route_2019-06-01_9.00am.gpx"), GPX).unwrap();
        tmp
    }

    #[test]
    fn test_parse_export_workouts() {
        let parsed = parse_export(EXPORT.as_bytes()).unwrap();
        assert_eq!(parsed.len(), 3);

        let run = &parsed[0].sample;
        assert_eq!(run.activity_code, ActivityType::Running.code());
        assert_eq!(run.duration_s, 1800.0);
        assert_eq!(run.total_distance_m, Some(5200.0));
        assert_eq!(run.start, Utc.with_ymd_and_hms(2019, 6, 1, 7, 0, 0).unwrap());
        assert_eq!(parsed[0].routes.len(), 1);
        assert_eq!(
            parsed[0].routes[0].file.as_deref(),
            Some("/workout-routes/route_2019-06-01_9.00am.gpx")
        );

        let ride = &parsed[1].sample;
        assert_eq!(ride.activity_code, ActivityType::Cycling.code());
        assert_eq!(ride.duration_s, 3600.0);
        assert!((ride.total_distance_m.unwrap() - 20_116.8).abs() < 1e-6);
        assert!(parsed[1].routes.is_empty());

        let tri = &parsed[2].sample;
        assert!(ActivityType::from_code(tri.activity_code).is_other());
        assert_eq!(tri.total_distance_m, None);
        assert_eq!(tri.duration_s, 2700.0);
    }

    #[test]
    fn test_uuids_are_stable() {
        let a = parse_export(EXPORT.as_bytes()).unwrap();
        let b = parse_export(EXPORT.as_bytes()).unwrap();
        assert_eq!(a[0].sample.uuid, b[0].sample.uuid);
        assert_eq!(a[0].routes[0].route.uuid, b[0].routes[0].route.uuid);
        assert_ne!(a[0].sample.uuid, a[1].sample.uuid);
    }

    #[tokio::test]
    async fn test_identical_workouts_keep_their_own_routes() {
        let twin = r#"startDate="2019-06-01 09:00:00 +0200" endDate="2019-06-01 09:30:00 +0200" sourceName="Watch" workoutActivityType="HKWorkoutActivityTypeRunning""#;
        let xml = format!(
            r#"<HealthData>
 <Workout {twin}>
  <WorkoutRoute startDate="2019-06-01 09:00:00 +0200" endDate="2019-06-01 09:30:00 +0200">
   <FileReference path="/workout-routes/route_2019-06-01_9.00am.gpx"/>
  </WorkoutRoute>
 </Workout>
 <Workout {twin}/>
</HealthData>"#
        );
        let tmp = fixture("workout-routes");
        fs::write(tmp.path().join("export.xml"), xml).unwrap();
        let store = ExportStore::open(tmp.path(), DEFAULT_BATCH_SIZE).unwrap();

        let all = store.query_workouts(&QueryWindow::UNBOUNDED).await.unwrap();
        let [NativeSample::Workout(first), NativeSample::Workout(second)] = all.as_slice() else {
            panic!("expected two workouts");
        };
        assert_ne!(first.uuid, second.uuid);
        assert_eq!(store.query_routes(first).await.unwrap().len(), 1);
        assert!(store.query_routes(second).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_queries_and_streams_batches() {
        let tmp = fixture("workout-routes");
        let store = ExportStore::open(tmp.path(), 2).unwrap();
        assert_eq!(store.workout_count(), 3);

        let window = QueryWindow {
            start: Some(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()),
            end: None,
        };
        assert_eq!(store.query_workouts(&window).await.unwrap().len(), 2);

        let all = store.query_workouts(&QueryWindow::UNBOUNDED).await.unwrap();
        let NativeSample::Workout(run) = &all[0] else {
            panic!("expected workout");
        };
        let routes = store.query_routes(run).await.unwrap();
        assert_eq!(routes.len(), 1);

        let mut stream = store.route_locations(&routes[0]);
        let first = stream.recv().await.unwrap().unwrap();
        assert_eq!(first.locations.len(), 2);
        assert!(!first.done);
        let second = stream.recv().await.unwrap().unwrap();
        assert_eq!(second.locations.len(), 1);
        assert!(second.done);
    }

    #[tokio::test]
    async fn test_route_file_found_by_name_elsewhere() {
        let tmp = fixture("elsewhere/deeper");
        let store = ExportStore::open(tmp.path(), DEFAULT_BATCH_SIZE).unwrap();
        let all = store.query_workouts(&QueryWindow::UNBOUNDED).await.unwrap();
        let NativeSample::Workout(run) = &all[0] else {
            panic!("expected workout");
        };
        let routes = store.query_routes(run).await.unwrap();
        let batch = store.route_locations(&routes[0]).recv().await.unwrap().unwrap();
        assert_eq!(batch.locations.len(), 3);
        assert!(batch.done);
    }

    #[tokio::test]
    async fn test_missing_route_file_streams_error() {
        let tmp = fixture("workout-routes");
        fs::remove_file(tmp.path().join("workout-routes/route_2019-06-01_9.00am.gpx")).unwrap();
        let store = ExportStore::open(tmp.path(), DEFAULT_BATCH_SIZE).unwrap();
        let all = store.query_workouts(&QueryWindow::UNBOUNDED).await.unwrap();
        let NativeSample::Workout(run) = &all[0] else {
            panic!("expected workout");
        };
        let routes = store.query_routes(run).await.unwrap();
        let item = store.route_locations(&routes[0]).recv().await.unwrap();
        assert!(matches!(item, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_open_without_export_xml() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(matches!(
            ExportStore::open(tmp.path(), DEFAULT_BATCH_SIZE),
            Err(StoreError::NotFound(_))
        ));
    }
}
