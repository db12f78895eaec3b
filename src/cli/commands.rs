use crate::config::{CliOverrides, ConfigLoader, ModulesConfig};
use crate::core::models::{CacheEntry, Resolution, ResolveContext};
use crate::core::services::ResourceService;
use crate::infrastructure::{is_native_source, ModuleResolver, ResourceLister, TokioFileSystemService};
use crate::utils::{Logger, Timer};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ui5-modules")]
#[command(version)]
#[command(about = "Resolve npm packages and serve them as sap.ui.define modules")]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project root holding package.json and ui5-modules.json
    #[arg(long, global = true, default_value = ".")]
    pub cwd: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the file a module specifier resolves to
    Resolve {
        specifier: String,
        /// Manifest fields in priority order
        #[arg(long, value_delimiter = ',')]
        main_fields: Option<Vec<String>>,
        /// Additional package lookup roots
        #[arg(long = "dep-path")]
        dep_paths: Vec<PathBuf>,
    },
    /// Bundle a module (or pass it through) and print or write the result
    Resource {
        specifier: String,
        /// Write the entry and its chunks below this directory
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Ignore cached output
        #[arg(long)]
        skip_cache: bool,
        /// Report chunk counts
        #[arg(long)]
        debug: bool,
        /// Inline dynamic imports instead of splitting them into chunks
        #[arg(long)]
        inline_dynamic_imports: bool,
        /// Serve the resolved file untransformed
        #[arg(long)]
        skip_transform: bool,
        /// Additional package lookup roots
        #[arg(long = "dep-path")]
        dep_paths: Vec<PathBuf>,
    },
    /// List the files of an installed package
    List {
        package: String,
        /// Globs of package-relative paths to leave out
        #[arg(long)]
        ignore: Vec<String>,
        /// Additional package lookup roots
        #[arg(long = "dep-path")]
        dep_paths: Vec<PathBuf>,
    },
    /// Report whether a file already is a UI5 module
    Classify { file: PathBuf },
}

pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> Result<()> {
        let cli = Cli::parse();
        Logger::init(cli.verbose);

        let cwd = cli
            .cwd
            .canonicalize()
            .with_context(|| format!("Project root {} not found", cli.cwd.display()))?;
        let file_config = ConfigLoader::load_from_file(&cwd)?;

        match cli.command {
            Commands::Resolve {
                specifier,
                main_fields,
                dep_paths,
            } => {
                let config = ConfigLoader::merge_with_cli(
                    file_config,
                    CliOverrides {
                        dep_paths,
                        ..Default::default()
                    },
                );
                self.handle_resolve_command(&cwd, &config, &specifier, main_fields)
            }
            Commands::Resource {
                specifier,
                out,
                skip_cache,
                debug,
                inline_dynamic_imports,
                skip_transform,
                dep_paths,
            } => {
                let config = ConfigLoader::merge_with_cli(
                    file_config,
                    CliOverrides {
                        skip_cache,
                        debug,
                        keep_dynamic_imports: inline_dynamic_imports.then_some(false),
                        skip_transform: skip_transform.then_some(true),
                        dep_paths,
                        ..Default::default()
                    },
                );
                self.handle_resource_command(&cwd, &config, &specifier, out.as_deref())
                    .await
            }
            Commands::List {
                package,
                ignore,
                dep_paths,
            } => {
                let config = ConfigLoader::merge_with_cli(
                    file_config,
                    CliOverrides {
                        ignore,
                        dep_paths,
                        ..Default::default()
                    },
                );
                self.handle_list_command(&cwd, &config, &package)
            }
            Commands::Classify { file } => self.handle_classify_command(&cwd.join(file)).await,
        }
    }

    fn handle_resolve_command(
        &self,
        cwd: &Path,
        config: &ModulesConfig,
        specifier: &str,
        main_fields: Option<Vec<String>>,
    ) -> Result<()> {
        let resolver = ModuleResolver::with_default_root(cwd);
        let mut context = config.resource_options(cwd).resolve_context();
        if let Some(fields) = main_fields {
            context = context.with_main_fields(fields);
        }

        match resolver.resolve(specifier, &context) {
            Resolution::Found(path) => {
                println!("{}", path.display());
                Ok(())
            }
            Resolution::Unresolved(reason) => bail!("Could not resolve {} ({:?})", specifier, reason),
            Resolution::Failed(message) => bail!("Could not resolve {}: {}", specifier, message),
        }
    }

    async fn handle_resource_command(
        &self,
        cwd: &Path,
        config: &ModulesConfig,
        specifier: &str,
        out: Option<&Path>,
    ) -> Result<()> {
        let _timer = Timer::start(&format!("resource {}", specifier));
        let resolver = Arc::new(ModuleResolver::with_default_root(cwd));
        let service = ResourceService::new(resolver, Arc::new(TokioFileSystemService));

        let Some(entry) = service
            .get_resource(specifier, &config.resource_config(), &config.resource_options(cwd))
            .await
        else {
            bail!("No output for {}", specifier);
        };

        match out {
            Some(dir) => write_output(dir, specifier, &entry).await,
            None => {
                println!("{}", entry.code);
                for name in entry.chunks.keys() {
                    Logger::info(&format!("Chunk {} (use --out to write it)", name));
                }
                Ok(())
            }
        }
    }

    fn handle_list_command(&self, cwd: &Path, config: &ModulesConfig, package: &str) -> Result<()> {
        let lister = ResourceLister::new(Arc::new(ModuleResolver::with_default_root(cwd)));
        for resource in lister.list_resources(package, &config.list_options(cwd))? {
            println!("{}", resource);
        }
        Ok(())
    }

    async fn handle_classify_command(&self, file: &Path) -> Result<()> {
        let source = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("Couldn't read {}", file.display()))?;
        let kind = if is_native_source(&source) {
            "ui5"
        } else {
            "npm"
        };
        println!("{}", kind);
        Ok(())
    }
}

/// Bundled entries land at `<specifier>.js`, passthrough files keep their name
async fn write_output(dir: &Path, specifier: &str, entry: &CacheEntry) -> Result<()> {
    let entry_path = match &entry.path {
        Some(source) if Path::new(specifier).extension().is_none() => {
            let ext = source.extension().and_then(|e| e.to_str()).unwrap_or("js");
            dir.join(format!("{}.{}", specifier, ext))
        }
        Some(_) => dir.join(specifier),
        None => dir.join(format!("{}.js", specifier)),
    };
    write_file(&entry_path, &entry.code).await?;

    for (name, chunk) in &entry.chunks {
        write_file(&dir.join(format!("{}.js", name)), &chunk.code).await?;
    }

    Logger::info(&format!(
        "Wrote {} ({} chunks) to {}",
        specifier,
        entry.chunks.len(),
        dir.display()
    ));
    Ok(())
}

async fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, contents)
        .await
        .with_context(|| format!("Couldn't write {}", path.display()))
}

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}
