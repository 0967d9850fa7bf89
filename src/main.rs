use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use cobalt_align::align::pairing::InsertModel;
use cobalt_align::align::{Aligner, Aln, AlnPair, ExtensionEngine, Scratch, SwScores};
use cobalt_align::encoding;
use cobalt_align::index::{GenomeIndex, Reference};
use cobalt_align::io::{sam, FastqReader, PairedReader, ReadRecord};
use cobalt_align::opts::{AlignOpt, IndexCliOptions, MapCliOptions};
use cobalt_align::scheduler::Scheduler;

#[derive(Parser)]
#[command(name = "cobalt")]
#[command(about = "Burrows-Wheeler short-read aligner", long_about = None)]
#[command(version)]
struct Cli {
    /// Verbosity: 1=error, 2=warning, 3=message, 4+=debug
    #[arg(short = 'v', long, global = true, value_name = "INT", default_value_t = 3)]
    verbosity: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the genome index for a reference
    Index {
        /// Input FASTA file (.fa, .fa.gz)
        #[arg(value_name = "REF.FA")]
        fasta: PathBuf,

        /// Output path for the index snapshot (default: REF.FA.cbi)
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: IndexCliOptions,
    },

    /// Map reads against a built index
    Map {
        /// Index snapshot built with 'index'
        #[arg(value_name = "INDEX")]
        index: PathBuf,

        /// Input FASTQ file(s): one for single-end, two for paired-end
        #[arg(value_name = "READS.FQ", required = true)]
        reads: Vec<PathBuf>,

        /// Output SAM file (default: stdout)
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,

        #[command(flatten)]
        options: MapCliOptions,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbosity {
        0 | 1 => log::LevelFilter::Error,
        2 => log::LevelFilter::Warn,
        3 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .format_timestamp(None)
        .init();

    let outcome = match cli.command {
        Commands::Index {
            fasta,
            output,
            options,
        } => run_index(&fasta, output, &options),
        Commands::Map {
            index,
            reads,
            output,
            options,
        } => run_map(&index, &reads, output, &options),
    };
    if let Err(err) = outcome {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}

fn run_index(fasta: &Path, output: Option<PathBuf>, options: &IndexCliOptions) -> Result<()> {
    let records = cobalt_align::io::fasta::read_reference(fasta)?;
    let reference = Reference::from_records(records)?;
    let sorter = options.sorter.build();
    let idx = GenomeIndex::build(reference, sorter.as_ref(), options.sa_interval)?;

    let out_path = output.unwrap_or_else(|| {
        let mut p = fasta.as_os_str().to_owned();
        p.push(".cbi");
        PathBuf::from(p)
    });
    idx.save(&out_path)
}

fn run_map(
    index: &Path,
    reads: &[PathBuf],
    output: Option<PathBuf>,
    options: &MapCliOptions,
) -> Result<()> {
    let opt = options.to_align_opt();
    opt.validate()
        .map_err(|errors| anyhow!("invalid parameters:\n  {}", errors.join("\n  ")))?;
    opt.log_parameters();

    let idx = GenomeIndex::load(index)?;
    let engine = if options.scalar_extension {
        ExtensionEngine::scalar(SwScores::default())
    } else {
        ExtensionEngine::probe(SwScores::default())
    };
    let mut aligner = Aligner::new(&idx, &opt, engine);

    let threads = options.threads.unwrap_or_else(num_cpus::get).max(1);
    let scheduler = Scheduler::new(threads).with_queue_depth(options.batch_size.max(1));
    log::info!("mapping with {threads} worker thread(s)");

    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            File::create(&path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(std::io::stdout())),
    };
    let command_line = std::env::args().collect::<Vec<_>>().join(" ");
    out.write_all(sam::header(&idx, &command_line).as_bytes())?;

    match reads {
        [single] => run_single_end(&aligner, &scheduler, &opt, single, options.batch_size, &mut out),
        [first, second] => run_paired_end(
            &mut aligner,
            &scheduler,
            &opt,
            first,
            second,
            options,
            &mut out,
        ),
        _ => bail!("expected one or two read files, got {}", reads.len()),
    }?;
    out.flush()?;
    Ok(())
}

fn run_single_end(
    aligner: &Aligner<'_>,
    scheduler: &Scheduler,
    opt: &AlignOpt,
    path: &Path,
    batch_size: usize,
    out: &mut dyn Write,
) -> Result<()> {
    let mut reader = FastqReader::open(path)?;
    let mut total = 0u64;

    loop {
        let mut batch = Vec::with_capacity(batch_size);
        while batch.len() < batch_size {
            match reader.next_record()? {
                Some(record) => batch.push(record),
                None => break,
            }
        }
        if batch.is_empty() {
            break;
        }
        total += batch.len() as u64;

        let mut lines: Vec<String> = Vec::with_capacity(batch.len());
        scheduler.run(
            batch.into_iter(),
            || Scratch::new(opt),
            |scratch, record: &ReadRecord| {
                let codes = encoding::encode(&record.seq);
                let aln = aligner.map_single(&codes, scratch);
                sam::single_record(aligner.index(), record, &aln).to_string()
            },
            |record| sam::single_record(aligner.index(), record, &Aln::unmapped()).to_string(),
            |line| lines.push(line),
        );
        for line in lines {
            writeln!(out, "{line}").context("writing SAM output")?;
        }
    }
    log::info!("mapped {total} read(s)");
    Ok(())
}

fn run_paired_end(
    aligner: &mut Aligner<'_>,
    scheduler: &Scheduler,
    opt: &AlignOpt,
    first: &Path,
    second: &Path,
    options: &MapCliOptions,
    out: &mut dyn Write,
) -> Result<()> {
    let mut reader = PairedReader::open(first, second)?;
    let mut batch_no = 0u64;
    let mut total = 0u64;

    loop {
        let mut batch = Vec::with_capacity(options.batch_size);
        while batch.len() < options.batch_size {
            match reader.next_pair()? {
                Some(pair) => batch.push(pair),
                None => break,
            }
        }
        if batch.is_empty() {
            break;
        }
        total += batch.len() as u64;

        let mut results: Vec<(ReadRecord, ReadRecord, AlnPair)> =
            Vec::with_capacity(batch.len());
        {
            let worker: &Aligner<'_> = aligner;
            scheduler.run(
                batch.into_iter(),
                || Scratch::new(opt),
                |scratch, task: &(ReadRecord, ReadRecord)| {
                    let codes1 = encoding::encode(&task.0.seq);
                    let codes2 = encoding::encode(&task.1.seq);
                    let pair = worker.map_pair(&codes1, &codes2, scratch);
                    (task.0.clone(), task.1.clone(), pair)
                },
                |task| (task.0.clone(), task.1.clone(), AlnPair::unmapped()),
                |result| results.push(result),
            );
        }

        // The first batch can feed the empirical insert-size model.
        if batch_no == 0 && options.estimate_insert {
            let samples: Vec<i64> = results
                .iter()
                .filter_map(|(_, _, pair)| {
                    let (a, b) = (&pair.first, &pair.second);
                    let unique =
                        a.sub_score < a.score && b.sub_score < b.score && !a.rescued && !b.rescued;
                    (a.is_mapped() && b.is_mapped() && a.forward != b.forward && unique)
                        .then(|| i64::from(pair.dist()))
                })
                .collect();
            let model = InsertModel::estimate(&samples, aligner.model(), opt.max_em_cnt);
            log::info!(
                "insert-size model: mean {:.1}, dev {:.1} ({} samples)",
                model.mean,
                model.dev,
                samples.len()
            );
            aligner.set_model(model);
        }

        for (r1, r2, pair) in &results {
            let (rec1, rec2) = sam::pair_records(aligner.index(), r1, r2, pair, opt);
            writeln!(out, "{rec1}").context("writing SAM output")?;
            writeln!(out, "{rec2}").context("writing SAM output")?;
        }
        batch_no += 1;
    }
    log::info!("mapped {total} read pair(s)");
    Ok(())
}
