use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::models::{Coordinate, SunPosition};

const J2000: f64 = 2_451_545.0;

/// Sun position for a local wall-clock date and time in `tz`.
///
/// Returns `None` when the local time does not exist in that zone (skipped by
/// a daylight-saving transition). Ambiguous times take the earlier instant.
pub fn sun_position(
    date: NaiveDate,
    time: NaiveTime,
    tz: Tz,
    coordinate: Coordinate,
) -> Option<SunPosition> {
    let instant = local_to_utc(date, time, tz)?;
    Some(sun_position_utc(&instant, coordinate))
}

pub fn local_to_utc(date: NaiveDate, time: NaiveTime, tz: Tz) -> Option<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|local| local.with_timezone(&Utc))
}

pub fn sun_position_utc(instant: &DateTime<Utc>, coordinate: Coordinate) -> SunPosition {
    let n = julian_day(instant) - J2000;
    let declination = solar_declination(n);
    let equation_of_time = equation_of_time(n);

    let solar_time = solar_time(instant, coordinate.lng, equation_of_time);
    let hour_angle = wrap_degrees(15.0 * (solar_time - 12.0));

    let lat_rad = coordinate.lat.to_radians();
    let dec_rad = declination.to_radians();
    let hour_rad = hour_angle.to_radians();

    let sin_elevation =
        lat_rad.sin() * dec_rad.sin() + lat_rad.cos() * dec_rad.cos() * hour_rad.cos();
    let elevation = sin_elevation.clamp(-1.0, 1.0).asin();

    let cos_elevation = elevation.cos();
    let azimuth_deg = if cos_elevation < 1e-9 {
        // Sun at the zenith or nadir; azimuth is undefined.
        180.0
    } else {
        let cos_azimuth = (dec_rad.sin() * lat_rad.cos()
            - dec_rad.cos() * lat_rad.sin() * hour_rad.cos())
            / cos_elevation;
        let azimuth = cos_azimuth.clamp(-1.0, 1.0).acos().to_degrees();
        if hour_angle > 0.0 {
            360.0 - azimuth
        } else {
            azimuth
        }
    };

    SunPosition {
        altitude_deg: elevation.to_degrees(),
        azimuth_deg: azimuth_deg.rem_euclid(360.0),
    }
}

/// Julian date including the fraction of the day.
fn julian_day(instant: &DateTime<Utc>) -> f64 {
    let a = (14 - instant.month() as i32) / 12;
    let y = instant.year() + 4800 - a;
    let m = instant.month() as i32 + 12 * a - 3;

    let day_number = instant.day() as i32 + (153 * m + 2) / 5 + 365 * y + y / 4 - y / 100 + y / 400
        - 32045;
    let day_fraction = (instant.hour() as f64 - 12.0) / 24.0
        + instant.minute() as f64 / 1440.0
        + instant.second() as f64 / 86_400.0;

    day_number as f64 + day_fraction
}

/// Mean longitude, mean anomaly (radians) and ecliptic longitude (degrees).
fn solar_longitudes(n: f64) -> (f64, f64, f64) {
    let l = (280.460 + 0.9856474 * n).rem_euclid(360.0);
    let g = (357.528 + 0.9856003 * n).rem_euclid(360.0).to_radians();
    let lambda = l + 1.915 * g.sin() + 0.020 * (2.0 * g).sin();
    (l, g, lambda)
}

fn obliquity(n: f64) -> f64 {
    23.439 - 0.0000004 * n
}

fn solar_declination(n: f64) -> f64 {
    let (_, _, lambda) = solar_longitudes(n);
    (obliquity(n).to_radians().sin() * lambda.to_radians().sin())
        .asin()
        .to_degrees()
}

/// Equation of time in minutes.
fn equation_of_time(n: f64) -> f64 {
    let (l, _, lambda) = solar_longitudes(n);
    let epsilon = obliquity(n).to_radians();
    let lambda = lambda.to_radians();
    let right_ascension = (epsilon.cos() * lambda.sin())
        .atan2(lambda.cos())
        .to_degrees()
        .rem_euclid(360.0);

    4.0 * wrap_degrees(l - right_ascension)
}

/// True solar time in hours.
fn solar_time(instant: &DateTime<Utc>, longitude: f64, equation_of_time: f64) -> f64 {
    let utc_hours =
        instant.hour() as f64 + instant.minute() as f64 / 60.0 + instant.second() as f64 / 3600.0;
    utc_hours + equation_of_time / 60.0 + longitude / 15.0
}

/// Wrap an angle into [-180, 180).
fn wrap_degrees(angle: f64) -> f64 {
    let wrapped = (angle + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped >= 180.0 { wrapped - 360.0 } else { wrapped }
}
