use std::env;
use std::fs;
use std::path::Path;
use std::process;

use etude::{
    generate_exercises, measure_at_second, validate_upload, DirectoryLibrary, EtudeConfig, EtudeError,
    MeasureRange, MusicXmlEngine, NotationEngine, ScoreLibrary,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: etude generate <input.musicxml> [--start N] [--end N] [--config config.yaml] [--output out.json]
       etude measure <input.musicxml> <seconds>
       etude library add <dir> <input.musicxml>
       etude library list <dir>";

#[derive(Serialize)]
struct GenerateOutput<'a> {
    exercises: &'a etude::ExerciseSet,
    start_measure: Option<u32>,
    end_measure: Option<u32>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();

    let result = match args.first().map(String::as_str) {
        Some("generate") => generate(&args[1..]),
        Some("measure") => measure(&args[1..]),
        Some("library") => library(&args[1..]),
        _ => usage(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn usage() -> ! {
    eprintln!("{}", USAGE);
    process::exit(1)
}

fn generate(args: &[String]) -> Result<(), EtudeError> {
    let mut input: Option<&str> = None;
    let mut start = None;
    let mut end = None;
    let mut config_path = None;
    let mut output_path = None;

    // Parse flags
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--start" => start = Some(parse_measure(flag_value(args, &mut i)?)?),
            "--end" => end = Some(parse_measure(flag_value(args, &mut i)?)?),
            "--config" => config_path = Some(flag_value(args, &mut i)?),
            "--output" => output_path = Some(flag_value(args, &mut i)?),
            other if input.is_none() && !other.starts_with("--") => input = Some(other),
            _ => return usage(),
        }
        i += 1;
    }
    let Some(input) = input else {
        return usage();
    };

    let config = match config_path {
        Some(path) => EtudeConfig::from_file(Path::new(path))?,
        None => EtudeConfig::default(),
    };

    let engine = MusicXmlEngine;
    let bytes = fs::read(input)?;
    let score = engine.parse(&bytes)?;
    let excerpt = engine.slice(&score, MeasureRange::new(start, end))?;
    let exercises = generate_exercises(&engine, &excerpt, &config)?;

    let output = GenerateOutput {
        exercises: &exercises,
        start_measure: start,
        end_measure: end,
    };
    let json = to_json(&output)?;

    // Output
    match output_path {
        Some(path) => {
            fs::write(path, &json)?;
            eprintln!("Wrote {} exercises to {}", exercises.len(), path);
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn measure(args: &[String]) -> Result<(), EtudeError> {
    let [input, seconds] = args else {
        return usage();
    };
    let second: f64 = seconds
        .parse()
        .map_err(|_| EtudeError::Config(format!("'{}' is not a number of seconds", seconds)))?;

    let config = EtudeConfig::default();
    let score = MusicXmlEngine.parse(&fs::read(input)?)?;
    println!("{}", measure_at_second(&score, second, config.default_bpm));
    Ok(())
}

fn library(args: &[String]) -> Result<(), EtudeError> {
    match args {
        [command, dir, input] if command == "add" => {
            let mut library = DirectoryLibrary::open(dir)?;
            let name = Path::new(input)
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| EtudeError::InputFormat(format!("'{}' has no file name", input)))?;
            let record = validate_upload(&MusicXmlEngine, &EtudeConfig::default(), name, fs::read(input)?)?;
            library.save_score(record)?;
            eprintln!("Added {} to {}", name, dir);
            Ok(())
        }
        [command, dir] if command == "list" => {
            let library = DirectoryLibrary::open(dir)?;
            for name in library.list_scores()? {
                println!("{}", name);
            }
            Ok(())
        }
        _ => usage(),
    }
}

fn flag_value<'a>(args: &'a [String], i: &mut usize) -> Result<&'a str, EtudeError> {
    *i += 1;
    match args.get(*i) {
        Some(value) => Ok(value.as_str()),
        None => usage(),
    }
}

/// Serialization failures surface as output I/O errors.
fn to_json<T: Serialize>(value: &T) -> Result<String, EtudeError> {
    serde_json::to_string_pretty(value).map_err(|e| EtudeError::Io(std::io::Error::from(e)))
}

fn parse_measure(value: &str) -> Result<u32, EtudeError> {
    value
        .parse()
        .map_err(|_| EtudeError::InvalidMeasureRange(format!("'{}' is not a measure number", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_to_json() {
        let output = GenerateOutput {
            exercises: &etude::ExerciseSet::default(),
            start_measure: Some(2),
            end_measure: None,
        };
        let json = to_json(&output).unwrap();
        assert!(json.contains("\"start_measure\": 2"));
    }

    #[test]
    fn test_unserializable_output_is_io_error() {
        // JSON object keys must be strings
        let mut map = BTreeMap::new();
        map.insert(vec![1u8], 1u8);
        assert!(matches!(to_json(&map), Err(EtudeError::Io(_))));
    }

    #[test]
    fn test_parse_measure() {
        assert_eq!(parse_measure("12").unwrap(), 12);
        assert!(matches!(parse_measure("x"), Err(EtudeError::InvalidMeasureRange(_))));
    }
}
