//! Criterion benchmarks for header canonicalization, unification and the text join.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_xlsxwriter::{Url, Workbook as XlsxWriter};
use sheet_unify::canonical::canonicalize;
use sheet_unify::join::join_text;
use sheet_unify::mapping::Mapping;
use sheet_unify::models::UploadedFile;
use sheet_unify::unify::unify;
use sheet_unify::workbook::read_workbook;

const HEADERS: [&str; 6] = [
    "Fecha Publicación",
    "Medio",
    "Título",
    "Autor/a",
    "Sección",
    "URL Noticia",
];

/// Workbook with `sheets` sheets of `rows` data rows each; the URL column is
/// hyperlinked on even rows.
fn build_workbook(sheets: usize, rows: usize) -> Vec<u8> {
    let mut workbook = XlsxWriter::new();
    for s in 0..sheets {
        let worksheet = workbook.add_worksheet();
        for (c, header) in HEADERS.iter().enumerate() {
            worksheet.write_string(0, c as u16, *header).unwrap();
        }
        for r in 1..=rows as u32 {
            let code = s as u32 * 100_000 + r;
            worksheet.write_string(r, 0, "2024-03-01").unwrap();
            worksheet.write_string(r, 1, "Diario Austral").unwrap();
            worksheet.write_string(r, 2, format!("Titular {code}")).unwrap();
            worksheet.write_string(r, 3, "Redacción").unwrap();
            worksheet.write_number(r, 4, (r % 12) as f64).unwrap();
            let url = format!("https://medios.cl/VerNoticia/{code}");
            if r % 2 == 0 {
                worksheet
                    .write_url_with_text(r, 5, Url::new(url.as_str()), "ver")
                    .unwrap();
            } else {
                worksheet.write_string(r, 5, url.as_str()).unwrap();
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}

fn build_document(records: usize) -> Vec<u8> {
    let mut xml = String::from("<noticias>");
    for code in 1..=records {
        xml.push_str(&format!(
            "<noticia><Url_Noticia>https://medios.cl/index/1/{code}</Url_Noticia>\
             <FullText>Texto completo de la nota {code}.</FullText></noticia>"
        ));
    }
    xml.push_str("</noticias>");
    xml.into_bytes()
}

fn bench_canonicalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonicalize");

    group.bench_function("accented_headers", |b| {
        b.iter(|| {
            for header in HEADERS {
                black_box(canonicalize(black_box(header)));
            }
        })
    });

    let long = "Descripción Ñandú  -- Güemes / Año ".repeat(20);
    group.bench_function("long_header", |b| {
        b.iter(|| canonicalize(black_box(&long)))
    });

    group.finish();
}

fn bench_unify(c: &mut Criterion) {
    let mapping = Mapping::new();
    let mut group = c.benchmark_group("unify");
    group.sample_size(20);

    for rows in [100, 1_000, 5_000] {
        let bytes = build_workbook(2, rows);

        group.bench_with_input(BenchmarkId::new("read_workbook", rows), &bytes, |b, bytes| {
            b.iter(|| read_workbook(black_box(bytes)).unwrap())
        });

        let sources = vec![
            UploadedFile::new("enero.xlsx", bytes.clone()),
            UploadedFile::new("febrero.xlsx", bytes.clone()),
        ];
        group.bench_with_input(BenchmarkId::new("two_files", rows), &sources, |b, sources| {
            b.iter(|| unify(black_box(sources), &mapping).unwrap())
        });
    }

    group.finish();
}

fn bench_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("text_join");
    group.sample_size(20);

    for rows in [1_000, 5_000] {
        let sources = vec![UploadedFile::new("simbiu.xlsx", build_workbook(1, rows))];
        let table = unify(&sources, &Mapping::new()).unwrap();
        let document = build_document(rows);

        group.bench_with_input(BenchmarkId::new("join", rows), &document, |b, document| {
            b.iter(|| join_text(table.clone(), black_box(document)).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_canonicalize, bench_unify, bench_join);
criterion_main!(benches);
