use crate::error::StoreError;
use crate::types::NativeLocation;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use std::fs;
use std::io::BufRead;
use std::path::Path;

/// Marker for fields the track point did not carry.
const INVALID: f64 = -1.0;

pub fn parse_gpx_points(path: &Path) -> Result<Vec<NativeLocation>, StoreError> {
    let bytes = fs::read(path)?;
    if bytes.is_empty() {
        return Ok(Vec::new());
    }
    parse_gpx_reader(bytes.as_slice())
}

/// Track points in document order. Points without lat/lon/time are dropped.
pub fn parse_gpx_reader<R: BufRead>(reader: R) -> Result<Vec<NativeLocation>, StoreError> {
    let mut xml = Reader::from_reader(reader);
    xml.config_mut().trim_text(true);

    let mut buf = Vec::new();

    let mut st = GpxState::default();
    let mut out: Vec<NativeLocation> = Vec::new();

    loop {
        match xml.read_event_into(&mut buf) {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => handle_gpx_start(&mut st, &e),
            Ok(Event::Empty(e)) => {
                handle_gpx_start(&mut st, &e);
                handle_gpx_end(&mut st, &e.to_end(), &mut out);
            }
            Ok(Event::End(e)) => handle_gpx_end(&mut st, &e, &mut out),
            Ok(Event::Text(e)) => handle_gpx_text(&mut st, &e),
            Err(e) => {
                return Err(StoreError::parse(format!(
                    "GPX XML parse error at {}: {e}",
                    xml.buffer_position()
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Time,
    Ele,
    Speed,
    Course,
    HAcc,
    VAcc,
}

#[derive(Default)]
struct GpxState {
    in_trkpt: bool,
    field: Option<Field>,

    cur_lat: Option<f64>,
    cur_lon: Option<f64>,
    cur_time: Option<DateTime<Utc>>,
    cur_ele: Option<f64>,
    cur_speed: Option<f64>,
    cur_course: Option<f64>,
    cur_hacc: Option<f64>,
    cur_vacc: Option<f64>,
}

impl GpxState {
    fn reset_point(&mut self) {
        *self = Self {
            in_trkpt: true,
            ..Self::default()
        };
    }
}

fn handle_gpx_start(st: &mut GpxState, e: &BytesStart<'_>) {
    match e.local_name().as_ref() {
        b"trkpt" => {
            st.reset_point();
            let (lat, lon) = parse_trkpt_lat_lon(e);
            st.cur_lat = lat;
            st.cur_lon = lon;
        }
        name if st.in_trkpt => {
            st.field = match name {
                b"time" => Some(Field::Time),
                b"ele" => Some(Field::Ele),
                b"speed" => Some(Field::Speed),
                b"course" => Some(Field::Course),
                b"hAcc" => Some(Field::HAcc),
                b"vAcc" => Some(Field::VAcc),
                _ => None,
            };
        }
        _ => {}
    }
}

fn handle_gpx_end(st: &mut GpxState, e: &BytesEnd<'_>, out: &mut Vec<NativeLocation>) {
    if e.local_name().as_ref() != b"trkpt" {
        st.field = None;
        return;
    }
    st.in_trkpt = false;

    let (Some(latitude), Some(longitude), Some(timestamp)) = (st.cur_lat, st.cur_lon, st.cur_time)
    else {
        return;
    };

    out.push(NativeLocation {
        latitude,
        longitude,
        timestamp,
        horizontal_accuracy: st.cur_hacc.unwrap_or(INVALID),
        // Without an elevation there is no valid altitude.
        vertical_accuracy: st.cur_ele.and(st.cur_vacc).unwrap_or(INVALID),
        speed: st.cur_speed.unwrap_or(INVALID),
        course: st.cur_course.unwrap_or(INVALID),
        altitude: st.cur_ele.unwrap_or(0.0),
        floor: None,
    });
}

fn handle_gpx_text(st: &mut GpxState, e: &BytesText<'_>) {
    let Some(field) = st.field else {
        return;
    };
    let Ok(s) = e.decode() else {
        return;
    };

    if field == Field::Time {
        if let Ok(dt_fixed) = DateTime::parse_from_rfc3339(s.as_ref()) {
            st.cur_time = Some(dt_fixed.with_timezone(&Utc));
        }
        return;
    }

    let Ok(v) = s.trim().parse::<f64>() else {
        return;
    };
    let slot = match field {
        Field::Ele => &mut st.cur_ele,
        Field::Speed => &mut st.cur_speed,
        Field::Course => &mut st.cur_course,
        Field::HAcc => &mut st.cur_hacc,
        Field::VAcc => &mut st.cur_vacc,
        Field::Time => return,
    };
    *slot = Some(v);
}

fn parse_trkpt_lat_lon(e: &BytesStart<'_>) -> (Option<f64>, Option<f64>) {
    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;

    for a in e.attributes().with_checks(false).flatten() {
        let key = a.key.as_ref();
        if key == b"lat"
            && let Ok(v) = a.unescape_value()
        {
            lat = v.parse::<f64>().ok();
        } else if key == b"lon"
            && let Ok(v) = a.unescape_value()
        {
            lon = v.parse::<f64>().ok();
        }
    }

    (lat, lon)
}
