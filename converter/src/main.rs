#[macro_use]
extern crate log;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use env_logger::Env;
use simage_core::{simage::FILE_TYPE_PARAM, utils, ParamBag, Simage};

const DEFAULT_LOGGING_LEVEL: &str = "info";
const PLUGINS_DIR_VARIABLE: &str = "SIMAGE_PLUGINS_DIR";
const DEFAULT_PLUGINS_DIR: &str = "plugins";
// understood by the ppm plugin
const ASCII_PARAM: &str = "ascii";

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or(DEFAULT_LOGGING_LEVEL)).init();
    let args: Vec<String> = env::args().collect();
    debug!("args are: {:?}", args);

    let mut simage = Simage::new();
    if let Err(err) = load_plugins(&mut simage) {
        error!("failed to load plugins: {}", err);
        return;
    }

    let command = args.get(1).map(String::as_str);
    if command == Some("savers") {
        list_savers(&simage);
    } else if command == Some("version") {
        let (major, minor, micro) = utils::version();
        info!("simage {}.{}.{}", major, minor, micro);
    } else if command == Some("info") {
        match argument_value(&args, "source") {
            Some(source) => print_info(&mut simage, &source),
            None => error!("please specify file to inspect, for example: converter info --source=example.ppm"),
        }
    } else if let (Some(source), Some(target)) = (argument_value(&args, "source"), argument_value(&args, "target")) {
        let mut params = ParamBag::new();
        if let Some(format) = argument_value(&args, "format") {
            params.set(FILE_TYPE_PARAM, format);
        }
        if argument_present(&args, "ascii") || argument_value(&args, "ascii").as_deref() == Some("true") {
            params.set(ASCII_PARAM, true);
        }

        convert_file(&mut simage, &source, &target, &params);
    } else {
        error!("please specify command:\nconverter --source=example.bmp --target=example.ppm [--format=ppm] [--ascii]\nconverter info --source=example.bmp\nconverter savers\nconverter version");
    }
}

fn plugins_dir() -> PathBuf {
    env::var_os(PLUGINS_DIR_VARIABLE)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_PLUGINS_DIR))
}

fn load_plugins(simage: &mut Simage) -> simage_core::Result<()> {
    let dir = plugins_dir();
    if let Err(err) = fs::create_dir_all(&dir) {
        error!("failed to create plugins directory: {}", err);
    }

    let loaded = simage.load_plugins(&dir)?;
    if loaded == 0 {
        warn!("no plugins in {}, build ppm_support or bmp_support and copy the library there", dir.to_string_lossy());
    }
    Ok(())
}

fn list_savers(simage: &Simage) {
    for index in 0..simage.num_savers() {
        let handle = match simage.saver_handle(index) {
            Some(v) => v,
            None => continue,
        };

        info!(
            "{} ({}): {}",
            simage.saver_full_name(handle).unwrap_or_default(),
            simage.saver_extensions(handle).unwrap_or_default(),
            simage.saver_description(handle).unwrap_or_default(),
        );
    }
}

fn print_info(simage: &mut Simage, source: &str) {
    let image = match simage.open_image(Path::new(source), true) {
        Ok(v) => v,
        Err(err) => {
            error!("Failed to open {}: {}", source, err);
            return;
        }
    };

    info!(
        "{}: {}x{}, {} component{}, {}",
        source,
        image.width(),
        image.height(),
        image.components(),
        if image.components() > 1 { "s" } else { "" },
        if image.is_incremental() { "read line by line" } else { "read at once" },
    );
}

fn convert_file(simage: &mut Simage, from_file: &str, to_file: &str, params: &ParamBag) {
    info!("Converting file {} to {}", from_file, to_file);

    let image = match simage.read_image(Path::new(from_file)) {
        Ok(v) => v,
        Err(err) => {
            error!("Failed to read {}: {}", from_file, err);
            return;
        }
    };
    info!("done reading {}x{} image", image.width(), image.height());

    match simage.save(Path::new(to_file), &image, Some(params)) {
        Ok(_) => info!("Result saved to {}", to_file),
        Err(err) => error!("Failed to save result: {}", err),
    }
}

fn argument_value(args: &[String], argument_name: &str) -> Option<String> {
    let prefix = format!("--{}=", argument_name);
    args.iter()
        .find_map(|s| s.strip_prefix(&prefix))
        .map(|s| s.to_string())
}

fn argument_present(args: &[String], argument_name: &str) -> bool {
    let flag = format!("--{}", argument_name);
    args.iter().any(|s| *s == flag)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn parses_arguments() {
        let args = args(&["converter", "--source=in.ppm", "--target=out.bmp", "--ascii"]);

        assert_eq!(argument_value(&args, "source").as_deref(), Some("in.ppm"));
        assert_eq!(argument_value(&args, "target").as_deref(), Some("out.bmp"));
        assert_eq!(argument_value(&args, "format"), None);
        assert!(argument_present(&args, "ascii"));
        assert!(!argument_present(&args, "source"));
    }
}
