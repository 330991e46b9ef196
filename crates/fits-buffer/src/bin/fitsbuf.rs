use fits_buffer::{ImageLoader, ImageSaver};
use std::process;

const USAGE: &str = "\
Usage: fitsbuf <input.fits> [options]

Loads a FITS image, multiplies every pixel by a constant and saves the result.

Options:
  -o, --output <path>   Output file (default: test.fits)
      --scale <factor>  Pixel multiplier (default: 1.001)
      --overwrite       Replace the output file if it exists";

const DEFAULT_OUTPUT: &str = "test.fits";
const DEFAULT_SCALE: f32 = 1.001;

#[derive(Debug, PartialEq)]
struct Options {
    input: String,
    output: String,
    scale: f32,
    overwrite: bool,
}

fn parse_args(args: &[String]) -> Result<Options, String> {
    let mut input = None;
    let mut output = String::from(DEFAULT_OUTPUT);
    let mut scale = DEFAULT_SCALE;
    let mut overwrite = false;

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-h" | "--help" => return Err(USAGE.to_string()),
            "-o" | "--output" => {
                output = iter
                    .next()
                    .ok_or_else(|| format!("{arg} requires a value\n\n{USAGE}"))?
                    .clone();
            }
            "--scale" => {
                let value = iter
                    .next()
                    .ok_or_else(|| format!("--scale requires a value\n\n{USAGE}"))?;
                scale = value
                    .parse()
                    .map_err(|_| format!("invalid scale factor: {value}"))?;
            }
            "--overwrite" => overwrite = true,
            other if other.starts_with('-') => {
                return Err(format!("unknown option: {other}\n\n{USAGE}"));
            }
            other => {
                if input.replace(other.to_string()).is_some() {
                    return Err(format!("unexpected argument: {other}\n\n{USAGE}"));
                }
            }
        }
    }

    Ok(Options {
        input: input.ok_or_else(|| USAGE.to_string())?,
        output,
        scale,
        overwrite,
    })
}

fn run(args: &[String]) -> Result<String, String> {
    let opts = parse_args(args)?;

    let mut buf = ImageLoader::new()
        .load(&opts.input)
        .map_err(|e| e.to_string())?;
    let extent = buf.extent();
    let mut out = format!("Loaded FITS: {} x {} pixels\n", extent[0], extent[1]);

    if let Some(pixels) = buf.as_f32_mut() {
        for p in pixels.iter_mut() {
            *p *= opts.scale;
        }
        buf.host_dirty = true;
    }

    ImageSaver::new()
        .overwrite(opts.overwrite)
        .save(&buf, &opts.output)
        .map_err(|e| e.to_string())?;
    out.push_str(&format!("Saved {}\n", opts.output));
    Ok(out)
}

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match run(&args) {
        Ok(output) => print!("{}", output),
        Err(msg) => {
            eprintln!("{}", msg);
            process::exit(1);
        }
    }
}
