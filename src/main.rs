use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use derlem::{
    DataDir, IndexStore, Retriever, Settings,
    categories::CategoryCatalog,
    cli::{Cli, Command, FilterArgs, MultiArgs, SearchArgs},
    corpus::DumpDir,
    embedding::{Embedder, HttpEmbedder},
    error,
    indexer::{self, BuildReport},
    reranker::{HttpReranker, RelevanceModel},
    retriever::{RetrievedDoc, SearchRequest},
};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("DERLEM_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn load_catalog() -> error::Result<CategoryCatalog> {
    match std::env::var("DERLEM_CATEGORIES_FILE") {
        Ok(path) => CategoryCatalog::from_json_file(path.as_ref()),
        Err(_) => Ok(CategoryCatalog::builtin()),
    }
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let mut settings = Settings::from_env();
    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let catalog = load_catalog()?;

    match cli.command {
        Command::Index(args) => {
            if let Some(strategy) = args.chunk_strategy {
                settings.chunking.strategy = strategy;
            }
            let embedder = HttpEmbedder::new(settings.embedding.clone())?;
            let store = open_store(&data_dir, &embedder);
            let report = indexer::build_index(
                &DumpDir::new(args.content_dir),
                &embedder,
                &store,
                &settings,
            )?;
            print_report(&report);
        }
        Command::Update(args) => {
            if let Some(strategy) = args.chunk_strategy {
                settings.chunking.strategy = strategy;
            }
            let embedder = HttpEmbedder::new(settings.embedding.clone())?;
            let store = open_store(&data_dir, &embedder);
            let report = indexer::update_index(
                &DumpDir::new(args.content_dir),
                &embedder,
                &store,
                &settings,
            )?;
            print_report(&report);
        }
        Command::Search(args) => {
            let mut retriever = make_retriever(&settings, data_dir, catalog)?;
            let request = search_request(&args, &settings);
            let results = retriever.search(&request)?;
            if args.json {
                print_json(&results)?;
            } else {
                print_human(&results);
            }
        }
        Command::Multi(args) => {
            let mut retriever = make_retriever(&settings, data_dir, catalog)?;
            let template = multi_request(&args, &settings);
            let results = retriever.multi_search(&args.queries, &template)?;
            if args.json {
                print_json(&results)?;
            } else {
                print_human(&results);
            }
        }
        Command::Suggest(args) => {
            let mut retriever = make_retriever(&settings, data_dir, catalog)?;
            let suggestions =
                retriever.suggest_categories(&args.query, args.count)?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&suggestions)?);
            } else {
                for s in &suggestions {
                    println!(
                        "[{:.3}] {} ({} chunks)",
                        s.score, s.category, s.chunk_count
                    );
                }
            }
        }
        Command::Categories(args) => {
            let mut retriever = make_retriever(&settings, data_dir, catalog)?;
            let categories = retriever.get_categories(args.min_chunks)?;
            if args.json {
                let map: serde_json::Map<String, serde_json::Value> =
                    categories
                        .iter()
                        .map(|(k, v)| (k.clone(), (*v).into()))
                        .collect();
                println!("{}", serde_json::to_string_pretty(&map)?);
            } else {
                for (category, count) in &categories {
                    println!("{count:>6}  {category}");
                }
            }
        }
        Command::Status(args) => {
            let mut retriever = make_retriever(&settings, data_dir, catalog)?;
            let dir = retriever.store_dir();
            let config = retriever.config()?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                println!("store:     {}", dir.display());
                println!(
                    "provider:  {} ({})",
                    config.embedding_provider, config.embedding_model
                );
                println!("dimension: {}", config.embedding_dim);
                println!("chunking:  {}", config.chunk_strategy);
                println!("chunks:    {}", config.num_chunks);
            }
        }
        Command::Completions(args) => {
            let mut command = Cli::command();
            let name = command.get_name().to_string();
            clap_complete::generate(
                args.shell,
                &mut command,
                name,
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

fn open_store(data_dir: &DataDir, embedder: &HttpEmbedder) -> IndexStore {
    IndexStore::at(data_dir.store_dir(embedder.provider(), embedder.model()))
}

fn make_retriever(
    settings: &Settings,
    data_dir: DataDir,
    catalog: CategoryCatalog,
) -> error::Result<Retriever> {
    let embedder = HttpEmbedder::new(settings.embedding.clone())?;
    let relevance: Option<Box<dyn RelevanceModel>> =
        if settings.rerank.base_url.is_empty() {
            None
        } else {
            Some(Box::new(HttpReranker::new(settings.rerank.clone())?))
        };

    Ok(Retriever::new(
        data_dir,
        settings.clone(),
        Box::new(embedder),
        relevance,
        catalog,
    ))
}

fn apply_filters(request: &mut SearchRequest, filters: &FilterArgs) {
    request.category = filters.category.clone();
    request.date_from = filters.date_from.clone();
    request.date_to = filters.date_to.clone();
}

fn search_request(args: &SearchArgs, settings: &Settings) -> SearchRequest {
    let mut request = SearchRequest::new(args.query.clone());
    request.top_k = args.count;
    request.diversify_by_source = !args.no_diversify;
    request.use_mmr = !args.no_mmr;
    request.mmr_lambda = settings.mmr_lambda;
    request.use_reranker = args.rerank;
    apply_filters(&mut request, &args.filters);
    request
}

fn multi_request(args: &MultiArgs, settings: &Settings) -> SearchRequest {
    let mut template = SearchRequest::new(String::new());
    template.top_k = args.count;
    template.use_mmr = !args.no_mmr;
    template.mmr_lambda = settings.mmr_lambda;
    template.use_reranker = args.rerank;
    apply_filters(&mut template, &args.filters);
    template
}

fn print_report(report: &BuildReport) {
    println!(
        "added {} chunk(s), {} total, {} document(s) already indexed",
        report.added_chunks, report.total_chunks, report.skipped_documents
    );
}

fn print_human(results: &[RetrievedDoc]) {
    if results.is_empty() {
        println!("No results found.");
        return;
    }

    for (i, doc) in results.iter().enumerate() {
        let md = &doc.metadata.doc;
        let title = if md.title.is_empty() {
            md.filename.as_str()
        } else {
            md.title.as_str()
        };
        let mut line = format!("{:>3}. [{:.3}] {title}", i + 1, doc.score);
        if !md.category.is_empty() {
            line.push_str(&format!(" ({})", md.category));
        }
        if !md.date.is_empty() {
            line.push_str(&format!(" [{}]", md.date));
        }
        println!("{line}");
        if !md.url.is_empty() {
            println!("     {}", md.url);
        }
    }
    println!("\n{} result(s)", results.len());
}

fn print_json(results: &[RetrievedDoc]) -> error::Result<()> {
    println!("{}", serde_json::to_string_pretty(results)?);
    Ok(())
}
