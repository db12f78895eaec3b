use crate::core::interfaces::{BundleOptions, BundleService, FileSystemService};
use crate::core::models::OutputFragment;
use crate::core::stage::{is_virtual, Diagnostic, DynamicImportMode, StageChain, StageContext};
use crate::infrastructure::node_resolver::ModuleResolver;
use crate::infrastructure::runtime::{render_chunk, render_entry, RenderedDep, RenderedDynamic, RenderedModule};
use crate::infrastructure::scanner::scan_dependencies;
use crate::stages::{
    AmdCustomStage, CommonJsStage, InjectEsModuleStage, JsonStage, NodePolyfillsStage,
    NodeResolveStage, PnpmResolveStage, ReplaceStage, SkipAssetsStage,
};
use crate::utils::{ErrorContext, ModulesError, Result, Timer};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Drives the stage chain over the module graph of one entry and renders
/// the result as `sap.ui.define` fragments
pub struct PipelineBundler {
    resolver: Arc<ModuleResolver>,
    fs: Arc<dyn FileSystemService>,
}

impl PipelineBundler {
    pub fn new(resolver: Arc<ModuleResolver>, fs: Arc<dyn FileSystemService>) -> Self {
        Self { resolver, fs }
    }

    /// Pre-stages, the built-in chain, then post-stages
    pub fn stage_chain(&self, options: &BundleOptions) -> Result<StageChain> {
        let mut chain = StageChain::new();
        chain.extend(options.pre_stages.iter().cloned());
        chain.register(Arc::new(ReplaceStage::node_env("development")?));
        chain.register(Arc::new(InjectEsModuleStage));
        chain.register(Arc::new(SkipAssetsStage::default()));
        chain.register(Arc::new(CommonJsStage));
        chain.register(Arc::new(AmdCustomStage));
        chain.register(Arc::new(NodePolyfillsStage));
        chain.register(Arc::new(JsonStage));
        chain.register(Arc::new(NodeResolveStage::new()));
        chain.register(Arc::new(PnpmResolveStage::new(self.resolver.clone())));
        chain.extend(options.post_stages.iter().cloned());
        Ok(chain)
    }

    async fn load(&self, chain: &StageChain, context: &StageContext, id: &str) -> Result<String> {
        if let Some(code) = chain.load(id, context)? {
            return Ok(code);
        }
        if is_virtual(id) {
            return Err(ModulesError::build(format!(
                "No stage provides the virtual module \"{}\"",
                id.trim_start_matches('\0')
            )));
        }

        self.fs.read_file(Path::new(id)).await.map_err(|e| {
            ModulesError::build_with_context(
                format!("Could not load {}: {}", id, e),
                ErrorContext::new().with_file(id),
            )
        })
    }

    async fn build_graph(
        &self,
        chain: &StageChain,
        context: &StageContext,
        entry: String,
    ) -> Result<ModuleGraph> {
        let mut graph = ModuleGraph::default();
        let mut queue = VecDeque::new();
        queue.push_back(graph.add(entry).0);

        while let Some(index) = queue.pop_front() {
            let id = graph.modules[index].id.clone();
            let code = self.load(chain, context, &id).await?;
            let code = chain.transform(code, &id, context)?;
            let scan = scan_dependencies(&code, &id)?;
            report_directives(&scan.directives, &id, context);

            let mut deps = Vec::new();
            let mut seen = HashSet::new();
            for site in scan.requires {
                let specifier = site.specifier;
                if !seen.insert(specifier.clone()) {
                    continue;
                }

                let dep = match chain.resolve_id(&specifier, Some(&id), context)? {
                    Some(resolved) if !resolved.external => {
                        let (target, added) = graph.add(resolved.id);
                        if added {
                            queue.push_back(target);
                        }
                        GraphDep::Module(target)
                    }
                    Some(resolved) => GraphDep::External(resolved.id),
                    None => {
                        warn_unresolved(context, &specifier, &id, &code, site.offset);
                        GraphDep::External(specifier.clone())
                    }
                };
                deps.push((specifier, dep));
            }

            let mut dynamic = Vec::new();
            let mut seen = HashSet::new();
            for site in scan.dynamic_imports {
                let specifier = site.specifier;
                if !seen.insert(specifier.clone()) {
                    continue;
                }

                let mode = chain.dynamic_import(&specifier, &id, context)?;
                let target = if mode == DynamicImportMode::Verbatim {
                    GraphDynamic::Verbatim(specifier.clone())
                } else {
                    match chain.resolve_id(&specifier, Some(&id), context)? {
                        Some(resolved) if !resolved.external => {
                            let (target, added) = graph.add(resolved.id);
                            if added {
                                queue.push_back(target);
                            }
                            if mode == DynamicImportMode::Split {
                                GraphDynamic::Split(target)
                            } else {
                                GraphDynamic::Inline(target)
                            }
                        }
                        Some(resolved) => GraphDynamic::Verbatim(resolved.id),
                        None => {
                            warn_unresolved(context, &specifier, &id, &code, site.offset);
                            GraphDynamic::Verbatim(specifier.clone())
                        }
                    }
                };
                dynamic.push((specifier, target));
            }

            let module = &mut graph.modules[index];
            module.code = route_dynamic_imports(&code, &scan.import_keywords);
            module.deps = deps;
            module.dynamic = dynamic;
        }

        Ok(graph)
    }
}

#[async_trait]
impl BundleService for PipelineBundler {
    async fn bundle(&self, specifier: &str, options: &BundleOptions) -> Result<Vec<OutputFragment>> {
        let _timer = Timer::start(&format!("Bundling {}", specifier));

        let chain = self.stage_chain(options)?;
        let context = StageContext::new(
            specifier,
            options.cwd.clone(),
            options.dep_paths.clone(),
            options.main_fields.clone(),
        );
        chain.build_start(&context)?;

        let entry = match chain.resolve_id(specifier, None, &context)? {
            Some(resolved) if !resolved.external => resolved.id,
            _ => {
                return Err(ModulesError::Resolve {
                    specifier: specifier.to_string(),
                    message: "the entry module cannot be resolved".to_string(),
                })
            }
        };

        let graph = self.build_graph(&chain, &context, entry).await?;
        graph.report_cycles(&context);
        debug!("{} modules in the graph of {}", graph.modules.len(), specifier);

        Ok(graph.render(specifier))
    }
}

#[derive(Debug, Clone)]
enum GraphDep {
    Module(usize),
    External(String),
}

#[derive(Debug, Clone)]
enum GraphDynamic {
    Verbatim(String),
    Inline(usize),
    Split(usize),
}

#[derive(Debug)]
struct GraphModule {
    id: String,
    code: String,
    deps: Vec<(String, GraphDep)>,
    dynamic: Vec<(String, GraphDynamic)>,
}

#[derive(Debug, Default)]
struct ModuleGraph {
    modules: Vec<GraphModule>,
    by_id: HashMap<String, usize>,
}

impl ModuleGraph {
    /// Index of `id`, and whether it was newly added
    fn add(&mut self, id: String) -> (usize, bool) {
        if let Some(&index) = self.by_id.get(&id) {
            return (index, false);
        }
        let index = self.modules.len();
        self.by_id.insert(id.clone(), index);
        self.modules.push(GraphModule {
            id,
            code: String::new(),
            deps: Vec::new(),
            dynamic: Vec::new(),
        });
        (index, true)
    }

    /// Modules reachable from `start` over static and inlined edges,
    /// skipping those in `exclude`
    fn reachable(&self, start: usize, exclude: &HashSet<usize>) -> Vec<usize> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([start]);
        visited.insert(start);

        while let Some(index) = queue.pop_front() {
            order.push(index);
            let module = &self.modules[index];
            let statics = module.deps.iter().filter_map(|(_, dep)| match dep {
                GraphDep::Module(target) => Some(*target),
                GraphDep::External(_) => None,
            });
            let inlined = module.dynamic.iter().filter_map(|(_, dep)| match dep {
                GraphDynamic::Inline(target) => Some(*target),
                _ => None,
            });
            for target in statics.chain(inlined) {
                if !exclude.contains(&target) && visited.insert(target) {
                    queue.push_back(target);
                }
            }
        }

        order
    }

    fn content_hash(&self, members: &[usize]) -> String {
        let mut hasher = blake3::Hasher::new();
        for &index in members {
            let module = &self.modules[index];
            hasher.update(module.id.as_bytes());
            hasher.update(&[0]);
            hasher.update(module.code.as_bytes());
        }
        hasher.finalize().to_hex().as_str()[..8].to_string()
    }

    fn report_cycles(&self, context: &StageContext) {
        const UNVISITED: u8 = 0;
        const ACTIVE: u8 = 1;
        const DONE: u8 = 2;

        if self.modules.is_empty() {
            return;
        }

        let mut state = vec![UNVISITED; self.modules.len()];
        let mut path: Vec<usize> = vec![0];
        let mut stack: Vec<(usize, usize)> = vec![(0, 0)];
        state[0] = ACTIVE;

        while let Some((index, next)) = stack.pop() {
            let targets: Vec<usize> = self.modules[index]
                .deps
                .iter()
                .filter_map(|(_, dep)| match dep {
                    GraphDep::Module(target) => Some(*target),
                    GraphDep::External(_) => None,
                })
                .collect();

            if let Some(&target) = targets.get(next) {
                stack.push((index, next + 1));
                match state[target] {
                    UNVISITED => {
                        state[target] = ACTIVE;
                        path.push(target);
                        stack.push((target, 0));
                    }
                    ACTIVE => {
                        let start = path.iter().position(|&p| p == target).unwrap_or(0);
                        let mut cycle: Vec<&str> =
                            path[start..].iter().map(|&p| self.modules[p].id.as_str()).collect();
                        cycle.push(self.modules[target].id.as_str());
                        context.warn(Diagnostic::new(
                            "CIRCULAR_DEPENDENCY",
                            format!("Circular dependency: {}", cycle.join(" -> ")),
                        ));
                    }
                    _ => {}
                }
            } else {
                state[index] = DONE;
                path.pop();
            }
        }
    }

    fn render(&self, specifier: &str) -> Vec<OutputFragment> {
        let main = self.reachable(0, &HashSet::new());
        let main_set: HashSet<usize> = main.iter().copied().collect();

        let mut targets: Vec<usize> = Vec::new();
        for module in &self.modules {
            for (_, dep) in &module.dynamic {
                if let GraphDynamic::Split(target) = dep {
                    if !main_set.contains(target) && !targets.contains(target) {
                        targets.push(*target);
                    }
                }
            }
        }

        let chunks: Vec<(String, Vec<usize>)> = targets
            .iter()
            .map(|&target| {
                let members = self.reachable(target, &main_set);
                (format!("{}-{}", specifier, self.content_hash(&members)), members)
            })
            .collect();
        let chunk_of: HashMap<usize, &str> = targets
            .iter()
            .zip(chunks.iter())
            .map(|(&target, (name, _))| (target, name.as_str()))
            .collect();

        let mut fragments = Vec::with_capacity(chunks.len() + 1);
        let (externals, rendered) = self.render_modules(&main, &chunk_of);
        fragments.push(OutputFragment::Chunk {
            file_name: format!("{}.js", specifier),
            code: render_entry(&externals, &rendered, 0),
            is_entry: true,
        });

        for (name, members) in &chunks {
            let (externals, rendered) = self.render_modules(members, &chunk_of);
            fragments.push(OutputFragment::Chunk {
                file_name: format!("{}.js", name),
                code: render_chunk(&externals, &rendered),
                is_entry: false,
            });
        }

        fragments
    }

    fn render_modules(
        &self,
        members: &[usize],
        chunk_of: &HashMap<usize, &str>,
    ) -> (Vec<String>, Vec<RenderedModule>) {
        let mut externals: Vec<String> = Vec::new();
        let rendered: Vec<RenderedModule> = members
            .iter()
            .map(|&index| {
                let module = &self.modules[index];
                let deps = module
                    .deps
                    .iter()
                    .map(|(specifier, dep)| {
                        let dep = match dep {
                            GraphDep::Module(target) => RenderedDep::Module(*target),
                            GraphDep::External(name) => {
                                if !externals.contains(name) {
                                    externals.push(name.clone());
                                }
                                RenderedDep::External(name.clone())
                            }
                        };
                        (specifier.clone(), dep)
                    })
                    .collect();
                let dynamic = module
                    .dynamic
                    .iter()
                    .map(|(specifier, dep)| {
                        let dep = match dep {
                            GraphDynamic::Verbatim(name) => RenderedDynamic::Verbatim(name.clone()),
                            GraphDynamic::Inline(target) => RenderedDynamic::Inline(*target),
                            GraphDynamic::Split(target) => match chunk_of.get(target) {
                                Some(chunk) => RenderedDynamic::Split {
                                    chunk: chunk.to_string(),
                                    module: *target,
                                },
                                // already part of the entry fragment
                                None => RenderedDynamic::Inline(*target),
                            },
                        };
                        (specifier.clone(), dep)
                    })
                    .collect();

                RenderedModule {
                    index,
                    code: module.code.clone(),
                    deps,
                    dynamic,
                }
            })
            .collect();

        (externals, rendered)
    }
}

/// Rewrite `import(` calls to the module-local `__import(` loader
fn route_dynamic_imports(code: &str, import_keywords: &[usize]) -> String {
    if import_keywords.is_empty() {
        return code.to_string();
    }

    let mut out = String::with_capacity(code.len() + import_keywords.len() * 2);
    let mut last = 0;
    for &position in import_keywords {
        out.push_str(&code[last..position]);
        out.push_str("__");
        last = position;
    }
    out.push_str(&code[last..]);
    out
}

fn report_directives(directives: &[String], id: &str, context: &StageContext) {
    for directive in directives {
        context.warn(Diagnostic::new(
            "MODULE_LEVEL_DIRECTIVE",
            format!(
                "Module level directives cause errors when bundled, \"{}\" in \"{}\" was ignored.",
                directive,
                id.trim_start_matches('\0')
            ),
        ));
    }
}

fn warn_unresolved(context: &StageContext, specifier: &str, importer: &str, code: &str, offset: usize) {
    let before = &code[..offset];
    let line = before.matches('\n').count() + 1;
    let column = offset - before.rfind('\n').map(|p| p + 1).unwrap_or(0);
    let frame = code.lines().nth(line - 1).unwrap_or_default().trim();

    context.warn(
        Diagnostic::new(
            "UNRESOLVED_IMPORT",
            format!(
                "\"{}\" could not be resolved, treating it as an external dependency",
                specifier
            ),
        )
        .at(importer.trim_start_matches('\0'), line, column)
        .with_frame(frame),
    );
}
