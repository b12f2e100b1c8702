use std::path::Path;

use gantry_core::PLACEHOLDER_REPOSITORY;

/// Scaffold gantry.toml and an environment directory with a Dockerfile.
pub fn init(env_name: &str) -> anyhow::Result<()> {
    let mut created = Vec::new();

    let config_path = Path::new("gantry.toml");
    if config_path.exists() {
        eprintln!("gantry.toml already exists, skipping");
    } else {
        let config = format!(
            r#"[project]
# name = "my-project"
# version = "0.1.0"

[image]
repository = "{PLACEHOLDER_REPOSITORY}"
# include = []
# exclude = []
"#
        );
        std::fs::write(config_path, config)?;
        created.push("gantry.toml".to_owned());
    }

    let env_dir = Path::new(env_name);
    let dockerfile_path = env_dir.join("Dockerfile");
    if dockerfile_path.exists() {
        eprintln!("{} already exists, skipping", dockerfile_path.display());
    } else {
        std::fs::create_dir_all(env_dir)?;
        std::fs::write(&dockerfile_path, DOCKERFILE_TEMPLATE)?;
        created.push(dockerfile_path.display().to_string());
    }

    if created.is_empty() {
        println!("Nothing to create — already initialized.");
    } else {
        for f in &created {
            println!("Created {f}");
        }
    }

    println!();
    println!("Next steps:");
    println!();
    println!("  1. Set [image].repository in gantry.toml (or remove it to keep images local)");
    println!();
    println!("  2. Lock your dependencies:");
    println!("     pip freeze > requirements.lock.txt");
    println!();
    println!("  3. Build:");
    println!("     gantry build {env_name}");

    Ok(())
}

const DOCKERFILE_TEMPLATE: &str = r#"FROM python:3.11-slim

COPY requirements.lock.txt /project/requirements.lock.txt
RUN pip install --no-cache-dir -r /project/requirements.lock.txt

# Uncompressed project source
COPY dist/ /tmp/dist/
RUN mkdir -p /project \
    && find /tmp/dist -maxdepth 1 -name '*.tar.gz' -exec tar xzf {} -C /project --strip-components 1 \; \
    && rm -rf /tmp/dist

# Prior local state staged by gantry
COPY dist/gantry/ /root/.gantry/

WORKDIR /project
ENTRYPOINT ["flow"]
"#;
