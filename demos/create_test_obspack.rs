//! Creates a small directory of ObsPack-style netCDF files for trying out obspack_daily.
//!
//! The directory holds surface, tower and aircraft files inside the demo
//! domain, plus files the selector is expected to leave out: an
//! `obspack_ch4` file, a file outside the lat/lon box and a file without
//! `obs_flag` (which is kept). A matching `config.yml` is written alongside.

use ndarray::{Array1, Array2};
use netcdf::types::NcVariableType;
use std::fs;
use std::path::Path;

/// 2019-07-01T00:00:00Z
const T0: i32 = 1_561_939_200;
const HOUR: i32 = 3_600;
const ID_WIDTH: usize = 64;

struct Site<'a> {
    file_name: &'a str,
    project: &'a str,
    utc2lst: f64,
    latitude: f32,
    longitude: f32,
    /// Start-to-midpoint span in seconds
    half_width: i32,
    with_obs_flag: bool,
}

fn write_site(dir: &Path, site: &Site, times: &[i32]) -> Result<(), Box<dyn std::error::Error>> {
    let path = dir.join(site.file_name);
    if path.exists() {
        fs::remove_file(&path)?;
    }
    let n = times.len();
    let mut file = netcdf::create(&path)?;

    file.add_attribute("dataset_project", site.project)?;
    file.add_attribute("dataset_name", site.file_name.trim_end_matches(".nc"))?;
    file.add_attribute("site_utc2lst", site.utc2lst)?;

    file.add_unlimited_dimension("obs")?;
    file.add_dimension("calendar_components", 6)?;
    file.add_dimension("char_obspack_id", ID_WIDTH)?;

    let units = "seconds since 1970-01-01T00:00:00Z";
    for (name, offset) in [("time", 0), ("start_time", -site.half_width), ("midpoint_time", 0)] {
        let mut var = file.add_variable::<i32>(name, &["obs"])?;
        var.put_attribute("units", units)?;
        let values = Array1::from_iter(times.iter().map(|t| t + offset));
        var.put(values.view(), 0..n)?;
    }

    {
        let mut var = file.add_variable::<i32>("time_components", &["obs", "calendar_components"])?;
        var.put_attribute("_FillValue", -9i32)?;
        let values = Array2::<i32>::from_shape_fn((n, 6), |(_, c)| if c == 0 { 2019 } else { 1 });
        var.put(values.view(), (0..n, 0..6))?;
    }

    let float_vars: [(&str, &str, f32); 4] = [
        ("value", "mol mol-1", 4.1e-4),
        ("latitude", "degrees_north", site.latitude),
        ("longitude", "degrees_east", site.longitude),
        ("altitude", "m", 250.0),
    ];
    for (name, unit, fill) in float_vars {
        let mut var = file.add_variable::<f32>(name, &["obs"])?;
        var.put_attribute("units", unit)?;
        var.put_attribute("_FillValue", -1e34f32)?;
        var.put(Array1::from_elem(n, fill).view(), 0..n)?;
    }

    {
        let mut var = file.add_variable::<i8>("assimilation_concerns", &["obs"])?;
        var.put(Array1::<i8>::zeros(n).view(), 0..n)?;
    }
    if site.with_obs_flag {
        let mut var = file.add_variable::<i8>("obs_flag", &["obs"])?;
        var.put(Array1::<i8>::ones(n).view(), 0..n)?;
    }

    {
        let mut var = file.add_variable_with_type(
            "obspack_id",
            &["obs", "char_obspack_id"],
            &NcVariableType::Char,
        )?;
        let mut bytes = vec![0u8; n * ID_WIDTH];
        for (i, row) in bytes.chunks_mut(ID_WIDTH).enumerate() {
            let id = format!("obspack_co2_demo~{}~{}", site.file_name.trim_end_matches(".nc"), i);
            let len = id.len().min(ID_WIDTH);
            row[..len].copy_from_slice(&id.as_bytes()[..len]);
        }
        var.put_raw_values(&bytes, (0..n, 0..ID_WIDTH))?;
    }

    println!("   📄 {} ({} records)", site.file_name, n);
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = Path::new("obspack_demo/data");
    let out_dir = Path::new("obspack_demo/daily");
    fs::create_dir_all(data_dir)?;

    println!("🔨 Creating demo ObsPack files in {}", data_dir.display());

    let hourly: Vec<i32> = (0..72).map(|i| T0 + i * HOUR).collect();
    let every_six: Vec<i32> = (0..12).map(|i| T0 + i * 6 * HOUR).collect();

    let sites = [
        Site {
            file_name: "co2_lef_tower-insitu_1_allvalid-396magl.nc",
            project: "tower-insitu",
            utc2lst: -6.0,
            latitude: 45.9,
            longitude: -90.3,
            half_width: HOUR / 2,
            with_obs_flag: true,
        },
        Site {
            file_name: "co2_nwr_surface-flask_1_representative.nc",
            project: "surface-flask",
            utc2lst: -7.0,
            latitude: 40.1,
            longitude: -105.6,
            half_width: 0,
            with_obs_flag: true,
        },
        Site {
            file_name: "co2_car_aircraft-pfp_1_allvalid.nc",
            project: "aircraft-pfp",
            utc2lst: 0.0,
            latitude: 40.9,
            longitude: -104.8,
            half_width: HOUR,
            with_obs_flag: false,
        },
        Site {
            file_name: "co2_cgo_surface-flask_1_representative.nc",
            project: "surface-flask",
            utc2lst: 10.0,
            latitude: -40.7,
            longitude: 144.7,
            half_width: HOUR,
            with_obs_flag: true,
        },
        Site {
            file_name: "obspack_ch4_1_GLOBALVIEWplus_v4.0.nc",
            project: "surface-flask",
            utc2lst: -7.0,
            latitude: 40.1,
            longitude: -105.6,
            half_width: HOUR,
            with_obs_flag: true,
        },
    ];
    for site in &sites {
        let times = if site.project == "tower-insitu" { &hourly } else { &every_six };
        write_site(data_dir, site, times)?;
    }

    let config = format!(
        "datadir: {}\noutdir: {}\noutfile_name_stem: obspack_co2_%Y%m%d.nc\n\
         start_time: 2019-07-01\nend_time: 2019-07-03\n\
         lat_min: 10.0\nlat_max: 80.0\nlon_min: -170.0\nlon_max: -50.0\n",
        data_dir.display(),
        out_dir.display()
    );
    fs::write("obspack_demo/config.yml", config)?;

    println!("✅ Wrote {} source files and obspack_demo/config.yml", sites.len());
    println!("\n🧪 Split them into daily files with:");
    println!("   cargo run -- --config obspack_demo/config.yml");

    Ok(())
}
