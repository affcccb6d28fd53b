use std::env;

use anyhow::Result;

use mioscopio::acquisition::OnlineAcquisition;
use mioscopio::classifier::{create_offline_classifier, OnlineEmgClassifier, OutputFormat};
use mioscopio::config::{SessionConfig, STREAMER_BIND_ADDR};

struct ClassifyOptions {
    config: SessionConfig,
    output_format: OutputFormat,
}

fn parse_args() -> Result<ClassifyOptions> {
    let mut output_format = OutputFormat::Predictions;
    let mut positional = Vec::new();

    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--probabilities" => output_format = OutputFormat::Probabilities,
            _ => positional.push(arg),
        }
    }

    Ok(ClassifyOptions {
        config: SessionConfig::from_args(positional.into_iter())?,
        output_format,
    })
}

fn main() -> Result<()> {
    let opts = parse_args()?;
    let folder = opts.config.output_folder();
    println!("🗂️  Entrenando con las capturas de {:?}", folder);

    let classifier = create_offline_classifier(&folder, None)?;

    let acquisition = OnlineAcquisition::start(STREAMER_BIND_ADDR)?;
    println!("🎬 Clasificando en vivo (Ctrl-C para salir)\n");

    let mut online = OnlineEmgClassifier::new(classifier, acquisition, opts.output_format);
    online.run()?;
    Ok(())
}
