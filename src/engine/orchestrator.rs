// ==========================================
// Excel 汇总工具 - 汇总编排器
// ==========================================
// 用途: 驱动 定位 → 取值 → 类型推断 → 写入 的主流程
// 每张控制表: ParseConfig → CopyHeaderRegion → 逐行处理 → Finalize
// 红线:
// - 单行失败只影响本行,从不中断整次运行
// - 已带公式的结果单元格不被覆盖
// - 结果文件只在全部处理完成后写出
// ==========================================

use crate::config::{AggregatorConfig, ControlConfig};
use crate::domain::{
    AggregationOutput, AggregationReport, CellOutcome, CellValue, ControlDirective,
    ControlSheet, DataTable, DisplayFormat, RawValue, ResultSheet, RowOutcome, RunStats,
    ScannedRow, SheetConfig, SkipReason,
};
use crate::engine::coercer::ValueCoercer;
use crate::engine::directive_parser::{DirectiveParser, ParsedControlSheet};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::extractor::CellValueExtractor;
use crate::engine::file_resolver::FileResolver;
use crate::engine::progress::ProgressSink;
use crate::engine::workbook_cache::WorkbookCache;
use crate::export::{result_file_name, write_result_workbook};
use crate::importer::{
    ControlReader, ControlWorkbookReader, ImportError, SourceReader, UniversalSourceReader,
};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, instrument, warn};

/// 结果表中写回源文件路径的列（A 列）
const SOURCE_PATH_COL: u32 = 0;

// ==========================================
// AggregationOrchestrator - 汇总编排器
// ==========================================
pub struct AggregationOrchestrator {
    config: AggregatorConfig,
    reader: Box<dyn SourceReader>,
    control_reader: Box<dyn ControlReader>,
    resolver: FileResolver,
    coercer: ValueCoercer,
    parser: DirectiveParser,
}

impl AggregationOrchestrator {
    /// 使用默认读表实现创建编排器
    pub fn new(config: AggregatorConfig) -> Self {
        Self::with_readers(
            config,
            Box::new(UniversalSourceReader),
            Box::new(ControlWorkbookReader),
        )
    }

    /// 注入读表实现（测试使用）
    pub fn with_readers(
        config: AggregatorConfig,
        reader: Box<dyn SourceReader>,
        control_reader: Box<dyn ControlReader>,
    ) -> Self {
        Self {
            coercer: ValueCoercer::new(config.operator_locale()),
            parser: DirectiveParser::new(config.layout.clone()),
            resolver: FileResolver::new(),
            reader,
            control_reader,
            config,
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    // ==========================================
    // 完整运行: 工作目录 → 结果文件
    // ==========================================

    /// 在工作目录中执行一次汇总并写出结果文件
    ///
    /// # 参数
    /// - work_dir: 工作目录（控制文件所在目录）
    /// - progress: 进度接收者
    /// - cancel: 中断标志（行与行之间检查）
    ///
    /// # 返回
    /// - Ok(AggregationReport): 结果文件绝对路径与统计
    /// - Err: 控制文件缺失/不可读、被中断、写出失败
    #[instrument(skip_all, fields(work_dir = %work_dir.display()))]
    pub fn run(
        &self,
        work_dir: &Path,
        progress: &mut dyn ProgressSink,
        cancel: &AtomicBool,
    ) -> EngineResult<AggregationReport> {
        let control_path = locate_control_workbook(work_dir, &self.config.control)?;
        info!(path = %control_path.display(), "找到控制文件");

        let sheets = self
            .control_reader
            .read_control_workbook(&control_path)
            .map_err(|e| EngineError::ControlWorkbookUnreadable {
                path: control_path.display().to_string(),
                message: e.to_string(),
            })?;

        let mut cache = WorkbookCache::new();
        let aggregated = self.aggregate(&sheets, &mut cache, progress, cancel);
        cache.release_all();
        let output = aggregated?;

        let output_dir = self
            .config
            .output
            .directory
            .clone()
            .unwrap_or_else(|| work_dir.to_path_buf());
        let file_name = result_file_name(Local::now().naive_local(), &self.config.output.file_suffix);
        let output_path = std::path::absolute(output_dir.join(file_name))
            .map_err(ImportError::from)?;

        write_result_workbook(&output.sheets, &output_path)?;

        info!(
            output = %output_path.display(),
            rows_total = output.stats.rows_total,
            rows_extracted = output.stats.rows_extracted,
            rows_skipped = output.stats.rows_skipped,
            cells_written = output.stats.cells_written,
            "汇总完成"
        );

        Ok(AggregationReport {
            control_path,
            output_path,
            sheet_names: output.sheets.iter().map(|s| s.name.clone()).collect(),
            stats: output.stats,
        })
    }

    // ==========================================
    // 内存汇总: 控制表 → 结果表
    // ==========================================

    /// 汇总全部控制表（不落盘）
    pub fn aggregate(
        &self,
        sheets: &[ControlSheet],
        cache: &mut WorkbookCache,
        progress: &mut dyn ProgressSink,
        cancel: &AtomicBool,
    ) -> EngineResult<AggregationOutput> {
        let parsed: Vec<ParsedControlSheet> =
            sheets.iter().map(|sheet| self.parser.parse(sheet)).collect();

        let mut stats = RunStats {
            rows_total: sheets
                .iter()
                .map(|sheet| self.parser.scanned_row_count(sheet))
                .sum(),
            ..Default::default()
        };
        progress.report(0, stats.rows_total);

        let mut results = Vec::with_capacity(sheets.len());
        for (sheet, parsed) in sheets.iter().zip(&parsed) {
            info!(sheet = %sheet.name, rows = parsed.rows.len(), "开始处理控制表");
            let mut result = self.copy_header_region(sheet, &parsed.config);

            for row in &parsed.rows {
                if cancel.load(Ordering::SeqCst) {
                    warn!(sheet = %sheet.name, "收到中断信号，停止处理");
                    return Err(EngineError::Interrupted);
                }

                match row {
                    ScannedRow::Directive(directive) => {
                        match self.process_directive(directive, &parsed.config, &mut result, cache) {
                            RowOutcome::Extracted { cells_written } => {
                                stats.rows_extracted += 1;
                                stats.cells_written += cells_written;
                            }
                            RowOutcome::Skipped(reason) => {
                                warn!(
                                    sheet = %sheet.name,
                                    row = directive.row_index + 1,
                                    file = %directive.file_name,
                                    reason = %reason,
                                    "跳过指令行"
                                );
                                stats.rows_skipped += 1;
                            }
                        }
                    }
                    ScannedRow::Ignored { row_index, reason } => {
                        debug!(row = row_index + 1, reason = reason.as_str(), "非指令行");
                        stats.rows_ignored += 1;
                    }
                }

                stats.rows_processed += 1;
                progress.report(stats.rows_processed, stats.rows_total);
            }

            results.push(result);
        }

        Ok(AggregationOutput {
            sheets: results,
            stats,
        })
    }

    /// 复制控制表（配置行之后的全部内容）到结果表
    fn copy_header_region(&self, sheet: &ControlSheet, config: &SheetConfig) -> ResultSheet {
        let mut result = ResultSheet::new(sheet.name.clone());
        result.freeze_rows = config.legend_rows();
        result.autofit_columns = config.autofit_columns || self.config.output.autofit_columns;

        let (Some(last_row), Some(last_col)) = (sheet.last_used_row(), sheet.last_used_column())
        else {
            return result;
        };

        for row in config.config_rows..=last_row {
            let Some(target_row) = config.result_row(row) else {
                continue;
            };
            for col in 0..=last_col {
                if let Some(formula) = sheet.formula(row, col) {
                    result.set_formula(target_row, col, formula);
                    continue;
                }
                let Some(raw) = sheet.values.get(row, col) else {
                    continue;
                };
                if let Some(value) = CellValue::from_raw_verbatim(raw) {
                    let format = match value {
                        CellValue::DateTime(_) => DisplayFormat::DateTime,
                        _ => DisplayFormat::General,
                    };
                    result.set_value(target_row, col, value, format);
                }
            }
        }
        result
    }

    /// 处理一条指令（行级隔离: 所有失败都转换为 Skipped）
    fn process_directive(
        &self,
        directive: &ControlDirective,
        config: &SheetConfig,
        result: &mut ResultSheet,
        cache: &mut WorkbookCache,
    ) -> RowOutcome {
        let Some(target_row) = config.result_row(directive.row_index) else {
            return RowOutcome::Skipped(SkipReason::ReadFailure("结果行越界".to_string()));
        };

        let Some(source_path) = self.resolver.resolve(
            directive.explicit_folder.as_deref(),
            &directive.file_name,
            &config.default_folder,
        ) else {
            return RowOutcome::Skipped(SkipReason::FileNotFound);
        };

        let table = match self.reader.read_sheet(&source_path, &directive.sheet_name) {
            Ok(table) => table,
            Err(ImportError::SheetNotFound { .. }) => {
                return RowOutcome::Skipped(SkipReason::SheetNotFound)
            }
            Err(e) => {
                warn!(path = %source_path.display(), error = %e, "源文件读取失败");
                return RowOutcome::Skipped(SkipReason::ReadFailure(e.to_string()));
            }
        };

        if directive.explicit_folder.is_none() {
            result.set_value(
                target_row,
                SOURCE_PATH_COL,
                CellValue::Text(source_path.display().to_string()),
                DisplayFormat::General,
            );
        }

        let mut extractor = CellValueExtractor::new(cache);
        let mut cells_written = 0;
        for target in &directive.targets {
            let outcome = self.write_target(
                &mut extractor,
                &table,
                &source_path,
                directive,
                config,
                target_row,
                target.column,
                &target.address,
                result,
            );
            match outcome {
                CellOutcome::Written => cells_written += 1,
                CellOutcome::MalformedAddress => {
                    warn!(row = directive.row_index + 1, address = %target.address, "单元格地址非法，跳过")
                }
                CellOutcome::NoData | CellOutcome::FormulaProtected => {}
            }
        }

        debug!(
            row = directive.row_index + 1,
            source = %source_path.display(),
            cells_written,
            "指令行完成"
        );
        RowOutcome::Extracted { cells_written }
    }

    #[allow(clippy::too_many_arguments)]
    fn write_target(
        &self,
        extractor: &mut CellValueExtractor<'_>,
        table: &DataTable,
        source_path: &Path,
        directive: &ControlDirective,
        config: &SheetConfig,
        target_row: u32,
        target_col: u32,
        address: &str,
        result: &mut ResultSheet,
    ) -> CellOutcome {
        let raw: RawValue =
            match extractor.extract(table, address, source_path, &directive.sheet_name) {
                Ok(Some(raw)) => raw,
                Ok(None) => return CellOutcome::NoData,
                Err(_) => return CellOutcome::MalformedAddress,
            };

        let Some(coerced) = self.coercer.coerce(&raw, config.decimal_precision) else {
            return CellOutcome::NoData;
        };

        debug!(
            row = directive.row_index + 1,
            address = %address,
            kind = coerced.value.type_name(),
            "取值完成"
        );
        if result.set_value(target_row, target_col, coerced.value, coerced.format) {
            CellOutcome::Written
        } else {
            CellOutcome::FormulaProtected
        }
    }
}

/// 在工作目录中查找控制文件（按文件名排序取第一个）
pub fn locate_control_workbook(dir: &Path, control: &ControlConfig) -> EngineResult<PathBuf> {
    let prefix = control.file_prefix.to_lowercase();
    let extension = control.file_extension.trim_start_matches('.').to_lowercase();
    let not_found = || EngineError::ControlWorkbookNotFound {
        dir: dir.display().to_string(),
        pattern: format!("{}*.{}", control.file_prefix, extension),
    };

    let entries = std::fs::read_dir(dir).map_err(|_| not_found())?;
    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            // 跳过 Excel 打开文件时留下的锁文件
            !name.starts_with("~$")
                && name.starts_with(&prefix)
                && name.ends_with(&format!(".{}", extension))
        })
        .collect();
    candidates.sort();

    candidates.into_iter().next().ok_or_else(not_found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::progress::RecordingProgress;
    use crate::importer::ImportResult;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    // ==========================================
    // 测试辅助
    // ==========================================

    /// 按文件名返回预置数据表的读表器
    struct MockSourceReader {
        tables: HashMap<(String, String), DataTable>,
    }

    impl SourceReader for MockSourceReader {
        fn read_sheet(&self, path: &Path, sheet_name: &str) -> ImportResult<DataTable> {
            let file = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            if file == "broken.xlsx" {
                return Err(ImportError::ExcelParseError("损坏".to_string()));
            }
            self.tables
                .get(&(file.clone(), sheet_name.to_string()))
                .cloned()
                .ok_or(ImportError::SheetNotFound {
                    file,
                    sheet: sheet_name.to_string(),
                })
        }
    }

    struct MockControlReader(Vec<ControlSheet>);

    impl ControlReader for MockControlReader {
        fn read_control_workbook(&self, _path: &Path) -> ImportResult<Vec<ControlSheet>> {
            Ok(self.0.clone())
        }
    }

    fn text(s: &str) -> RawValue {
        RawValue::Text(s.to_string())
    }

    fn sales_table() -> DataTable {
        let mut table = DataTable::new();
        table.set(1, 1, RawValue::Number(1234.5));
        table.set(2, 1, text("1 000,5"));
        table.set(3, 1, text("=SUM(B1:B5)"));
        table
    }

    fn orchestrator(sheets: Vec<ControlSheet>) -> AggregationOrchestrator {
        let mut tables = HashMap::new();
        tables.insert(("sales.xlsx".to_string(), "Q1".to_string()), sales_table());
        AggregationOrchestrator::with_readers(
            AggregatorConfig::default(),
            Box::new(MockSourceReader { tables }),
            Box::new(MockControlReader(sheets)),
        )
    }

    /// 数据目录: <tmp>/data/region/{sales.xlsx, broken.xlsx}
    fn data_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        let region = dir.path().join("data").join("region");
        fs::create_dir_all(&region).unwrap();
        fs::write(region.join("sales.xlsx"), b"stub").unwrap();
        fs::write(region.join("broken.xlsx"), b"stub").unwrap();
        dir
    }

    fn control_sheet(data_root: &Path) -> ControlSheet {
        let mut values = DataTable::new();
        values.set(0, 1, text(&data_root.display().to_string()));
        values.set(1, 1, text("2"));
        values.set(2, 0, text("Папка"));
        values.set(2, 3, text("Выручка"));
        // 行 4: 正常指令
        values.set(3, 1, text("sales.xlsx"));
        values.set(3, 2, text("Q1"));
        values.set(3, 3, text("B2"));
        values.set(3, 4, text("B3"));
        values.set(3, 5, text("B4"));
        values.set(3, 6, text("??"));
        // 行 5: 文件不存在
        values.set(4, 1, text("missing.xlsx"));
        values.set(4, 2, text("Q1"));
        values.set(4, 3, text("B2"));
        // 行 6: 非指令行（无工作表名）
        values.set(5, 1, text("sales.xlsx"));
        // 行 7: 工作表不存在
        values.set(6, 1, text("sales.xlsx"));
        values.set(6, 2, text("Q9"));
        values.set(6, 3, text("B2"));
        // 行 8: 读取失败
        values.set(7, 1, text("broken.xlsx"));
        values.set(7, 2, text("Q1"));
        values.set(7, 3, text("B2"));
        ControlSheet::new("Group", values).with_formula(2, 7, "=SUM(D2:D6)")
    }

    // ==========================================
    // 测试用例
    // ==========================================

    #[test]
    fn test_aggregate_extracts_and_isolates_rows() {
        let dir = data_dir();
        let data_root = dir.path().join("data");
        let sheets = vec![control_sheet(&data_root)];
        let orch = orchestrator(sheets.clone());

        let mut cache = WorkbookCache::new();
        let mut progress = RecordingProgress::default();
        let output = orch
            .aggregate(&sheets, &mut cache, &mut progress, &AtomicBool::new(false))
            .unwrap();

        let result = &output.sheets[0];
        assert_eq!(result.name, "Group");
        assert_eq!(result.freeze_rows, 1);

        // 表头复制: 控制表第 3 行 → 结果表第 1 行,公式保持为公式
        assert_eq!(result.value(0, 0), Some(&CellValue::Text("Папка".to_string())));
        assert!(result.has_formula(0, 7));

        // 行 4 → 结果第 2 行
        assert_eq!(result.value(1, 3), Some(&CellValue::Number(1234.5)));
        assert_eq!(
            result.get(1, 3),
            Some(&crate::domain::ResultCell::Value {
                value: CellValue::Number(1234.5),
                format: DisplayFormat::Number { decimals: 2 },
            })
        );
        assert_eq!(result.value(1, 4), Some(&CellValue::Number(1000.5)));
        assert_eq!(result.value(1, 5), Some(&CellValue::Text("=SUM(B1:B5)".to_string())));
        // 非法地址列保持复制值
        assert_eq!(result.value(1, 6), Some(&CellValue::Text("??".to_string())));
        let expected_path = data_root.join("region").join("sales.xlsx");
        assert_eq!(
            result.value(1, 0),
            Some(&CellValue::Text(
                std::path::absolute(expected_path).unwrap().display().to_string()
            ))
        );

        // 文件不存在: 目标单元格保持复制值
        assert_eq!(result.value(2, 3), Some(&CellValue::Text("B2".to_string())));
        assert_eq!(result.value(2, 0), None);

        assert_eq!(
            output.stats,
            RunStats {
                rows_total: 5,
                rows_processed: 5,
                rows_extracted: 1,
                rows_skipped: 3,
                rows_ignored: 1,
                cells_written: 3,
            }
        );
        assert_eq!(progress.reports.first(), Some(&(0, 5)));
        assert_eq!(progress.last(), Some((5, 5)));
        assert!(progress.reports.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_formula_cells_are_never_overwritten() {
        let dir = data_dir();
        let mut sheet = control_sheet(&dir.path().join("data"));
        sheet = sheet.with_formula(3, 3, "=1+1");
        let sheets = vec![sheet];
        let orch = orchestrator(sheets.clone());

        let output = orch
            .aggregate(
                &sheets,
                &mut WorkbookCache::new(),
                &mut RecordingProgress::default(),
                &AtomicBool::new(false),
            )
            .unwrap();

        assert_eq!(
            output.sheets[0].get(1, 3),
            Some(&crate::domain::ResultCell::Formula("=1+1".to_string()))
        );
        assert_eq!(output.stats.cells_written, 2);
    }

    #[test]
    fn test_explicit_folder_does_not_write_path() {
        let dir = data_dir();
        let region = dir.path().join("data").join("region");
        let mut values = DataTable::new();
        values.set(3, 0, text(&region.display().to_string()));
        values.set(3, 1, text("sales.xlsx"));
        values.set(3, 2, text("Q1"));
        values.set(3, 3, text("B2"));
        let sheets = vec![ControlSheet::new("S", values)];
        let orch = orchestrator(sheets.clone());

        let output = orch
            .aggregate(
                &sheets,
                &mut WorkbookCache::new(),
                &mut RecordingProgress::default(),
                &AtomicBool::new(false),
            )
            .unwrap();

        let result = &output.sheets[0];
        assert_eq!(result.value(1, 0), Some(&CellValue::Text(region.display().to_string())));
        assert_eq!(result.value(1, 3), Some(&CellValue::Number(1234.5)));
        // 未配置精度: 默认 6 位
        assert_eq!(
            result.get(1, 3),
            Some(&crate::domain::ResultCell::Value {
                value: CellValue::Number(1234.5),
                format: DisplayFormat::Number { decimals: 6 },
            })
        );
    }

    #[test]
    fn test_empty_sheet_reports_zero_of_zero() {
        let mut values = DataTable::new();
        values.set(0, 1, text("/data"));
        values.set(2, 0, text("Легенда"));
        let sheets = vec![ControlSheet::new("Empty", values)];
        let orch = orchestrator(sheets.clone());
        let mut progress = RecordingProgress::default();

        let output = orch
            .aggregate(&sheets, &mut WorkbookCache::new(), &mut progress, &AtomicBool::new(false))
            .unwrap();

        assert_eq!(output.sheets[0].cells.len(), 1);
        assert_eq!(progress.reports, vec![(0, 0)]);
        assert_eq!(crate::engine::progress::percent(0, 0), 100.0);
    }

    #[test]
    fn test_interrupt_stops_before_next_row() {
        let dir = data_dir();
        let sheets = vec![control_sheet(&dir.path().join("data"))];
        let orch = orchestrator(sheets.clone());
        let mut progress = RecordingProgress::default();

        let result = orch.aggregate(
            &sheets,
            &mut WorkbookCache::new(),
            &mut progress,
            &AtomicBool::new(true),
        );

        assert!(matches!(result, Err(EngineError::Interrupted)));
        assert_eq!(progress.reports, vec![(0, 5)]);
    }

    #[test]
    fn test_locate_control_workbook() {
        let dir = TempDir::new().unwrap();
        let config = ControlConfig::default();
        assert!(matches!(
            locate_control_workbook(dir.path(), &config),
            Err(EngineError::ControlWorkbookNotFound { .. })
        ));

        fs::write(dir.path().join("~$control_a.xlsx"), b"lock").unwrap();
        fs::write(dir.path().join("control_b.xlsx"), b"").unwrap();
        fs::write(dir.path().join("control_a.xlsx"), b"").unwrap();
        fs::write(dir.path().join("report.xlsx"), b"").unwrap();

        let found = locate_control_workbook(dir.path(), &config).unwrap();
        assert_eq!(found.file_name().unwrap(), "control_a.xlsx");
    }

    #[test]
    fn test_run_without_control_workbook_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let orch = orchestrator(Vec::new());
        let result = orch.run(dir.path(), &mut RecordingProgress::default(), &AtomicBool::new(false));

        assert!(matches!(result, Err(EngineError::ControlWorkbookNotFound { .. })));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
