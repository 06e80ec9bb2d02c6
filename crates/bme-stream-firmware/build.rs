//! Bakes the acquisition settings from `.env` into the firmware image.
//!
//! | Variable                 | Default | Meaning                         |
//! |--------------------------|---------|---------------------------------|
//! | `BME_STREAM_OUTPUT_MODE` | `fixed` | `fixed` or `float` output lines |
//! | `BME_STREAM_INTERVAL_MS` | `1000`  | Trigger-to-read wait per cycle  |

const SETTINGS: [(&str, &str); 2] = [
    ("BME_STREAM_OUTPUT_MODE", "fixed"),
    ("BME_STREAM_INTERVAL_MS", "1000"),
];

fn main() {
    println!("cargo:rustc-link-arg=-Tlinkall.x");
    println!("cargo:rerun-if-changed=.env");

    // A missing .env is fine, the defaults apply
    let _ = dotenvy::dotenv();

    for (key, default) in SETTINGS {
        println!("cargo:rerun-if-env-changed={key}");
        let value = std::env::var(key).unwrap_or_else(|_| default.to_string());
        println!("cargo:rustc-env={key}={value}");
    }
}
