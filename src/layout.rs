//! Report layout registry: per-report-type source format, sheet descriptors,
//! and field dictionaries.
//!
//! Layouts are versioned configuration, not code — when a marketplace changes
//! its export format, the fix is an edit here, never in the readers or the
//! validator. The registry is immutable after [`LayoutRegistry::new`] and is
//! passed by reference into the pipeline.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{IngestError, IngestResult};

/// Enumerated marketplace report types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportType {
    /// Ozon orders export (CSV).
    OzonOrders,
    /// Ozon product list (CSV or the «Товары и цены» workbook).
    OzonProducts,
    /// Ozon barcode workbook.
    OzonBarcodes,
    /// Ozon category products template workbook (multi-sheet).
    OzonCategoryProducts,
    /// Wildberries product workbook.
    WbProducts,
    /// Wildberries prices/stock workbook.
    WbPrices,
}

impl ReportType {
    /// All known report types.
    pub const ALL: [ReportType; 6] = [
        ReportType::OzonOrders,
        ReportType::OzonProducts,
        ReportType::OzonBarcodes,
        ReportType::OzonCategoryProducts,
        ReportType::WbProducts,
        ReportType::WbPrices,
    ];

    /// Stable snake_case identifier, used for audit records and table names.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::OzonOrders => "ozon_orders",
            ReportType::OzonProducts => "ozon_products",
            ReportType::OzonBarcodes => "ozon_barcodes",
            ReportType::OzonCategoryProducts => "ozon_category_products",
            ReportType::WbProducts => "wb_products",
            ReportType::WbPrices => "wb_prices",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReportType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown report type '{s}'"))
    }
}

/// Source file format of a layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// Delimited text (`.csv`).
    Delimited,
    /// Spreadsheet workbook (`.xlsx`, `.xls`).
    Workbook,
}

impl SourceFormat {
    /// Derive the format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(Self::Delimited),
            "xlsx" | "xls" => Some(Self::Workbook),
            _ => None,
        }
    }

    /// Extensions this format is accepted under.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            SourceFormat::Delimited => &["csv"],
            SourceFormat::Workbook => &["xlsx", "xls"],
        }
    }
}

/// Logical kind a source field is coerced into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Trimmed string.
    Str,
    /// Integer; non-numeric input soft-fails to null.
    Integer,
    /// Decimal; comma decimal separators are tolerated.
    Decimal,
    /// да/нет/yes/no/true/false boolean; anything else is null.
    Boolean,
    /// JSON document; a present but unparseable value is a fatal field error.
    Json,
    /// Wide integer identifier (SKUs).
    BigInt,
}

/// One entry of a field dictionary: source column label -> canonical field.
#[derive(Debug, Clone)]
pub struct FieldRule {
    /// Column label as it appears in the export header.
    pub label: &'static str,
    /// Canonical field name in the target dataset.
    pub canonical: &'static str,
    /// Coercion kind.
    pub kind: FieldKind,
    /// Required fields reject the record when empty.
    pub required: bool,
    /// Vendor-code cleanup: source systems wrap identifiers in single quotes
    /// inconsistently, so those are stripped for this field.
    pub strip_quotes: bool,
}

const fn req(label: &'static str, canonical: &'static str, kind: FieldKind) -> FieldRule {
    FieldRule {
        label,
        canonical,
        kind,
        required: true,
        strip_quotes: false,
    }
}

const fn opt(label: &'static str, canonical: &'static str, kind: FieldKind) -> FieldRule {
    FieldRule {
        label,
        canonical,
        kind,
        required: false,
        strip_quotes: false,
    }
}

const fn code(label: &'static str, canonical: &'static str) -> FieldRule {
    FieldRule {
        label,
        canonical,
        kind: FieldKind::Str,
        required: true,
        strip_quotes: true,
    }
}

/// Configuration for one sheet of a report (delimited reports have exactly
/// one, with `sheet_name` unused).
#[derive(Debug, Clone)]
pub struct SheetLayout {
    /// Workbook tab name; ignored for delimited input.
    pub sheet_name: &'static str,
    /// 1-based header row index.
    pub header_row: usize,
    /// 1-based first data row index.
    pub data_start_row: usize,
    /// Field dictionary for this sheet, in column order.
    pub fields: Vec<FieldRule>,
}

/// Immutable configuration for one (report type, format) pair.
#[derive(Debug, Clone)]
pub struct ReportLayout {
    /// Report type this layout belongs to.
    pub report_type: ReportType,
    /// Source format this layout reads.
    pub format: SourceFormat,
    /// Field delimiter for delimited input.
    pub delimiter: u8,
    /// Sheet descriptors; the first is the primary sheet, later ones are
    /// optional secondary sheets joined on `merge_key`.
    pub sheets: Vec<SheetLayout>,
    /// Natural-key column label joining multi-sheet records.
    pub merge_key: Option<&'static str>,
}

impl ReportLayout {
    /// Primary sheet descriptor.
    pub fn primary_sheet(&self) -> &SheetLayout {
        &self.sheets[0]
    }

    /// Whether records for this layout span multiple sheets.
    pub fn is_multi_sheet(&self) -> bool {
        self.sheets.len() > 1
    }

    /// Field rules across all sheets, deduplicated by canonical name (the
    /// merge key appears on every sheet but contributes one field).
    pub fn merged_fields(&self) -> Vec<&FieldRule> {
        let mut seen: Vec<&str> = Vec::new();
        let mut out = Vec::new();
        for sheet in &self.sheets {
            for rule in &sheet.fields {
                if !seen.contains(&rule.canonical) {
                    seen.push(rule.canonical);
                    out.push(rule);
                }
            }
        }
        out
    }

    /// Tab names this layout expects in a workbook.
    pub fn sheet_names(&self) -> Vec<&'static str> {
        self.sheets.iter().map(|s| s.sheet_name).collect()
    }
}

/// Read-only registry holding one layout per (report type, format) pair.
#[derive(Debug)]
pub struct LayoutRegistry {
    layouts: Vec<ReportLayout>,
}

impl LayoutRegistry {
    /// Build the registry with every known layout.
    pub fn new() -> Self {
        Self {
            layouts: vec![
                ozon_orders_csv(),
                ozon_products_csv(),
                ozon_products_xlsx(),
                ozon_barcodes_xlsx(),
                ozon_category_products_xlsx(),
                wb_products_xlsx(),
                wb_prices_xlsx(),
            ],
        }
    }

    /// Resolve the layout for a report type and file extension.
    ///
    /// Fails with [`IngestError::UnsupportedFormat`] (naming the accepted
    /// extensions) when the pair is not registered.
    pub fn resolve(&self, report_type: ReportType, extension: &str) -> IngestResult<&ReportLayout> {
        let unsupported = || IngestError::UnsupportedFormat {
            report_type,
            extension: extension.to_string(),
            accepted: self.accepted_extensions(report_type),
        };

        let format = SourceFormat::from_extension(extension).ok_or_else(unsupported)?;
        self.layouts
            .iter()
            .find(|l| l.report_type == report_type && l.format == format)
            .ok_or_else(unsupported)
    }

    /// Extensions accepted for a report type, across its registered formats.
    pub fn accepted_extensions(&self, report_type: ReportType) -> Vec<String> {
        let mut out = Vec::new();
        for layout in &self.layouts {
            if layout.report_type == report_type {
                for ext in layout.format.extensions() {
                    if !out.iter().any(|e| e == ext) {
                        out.push((*ext).to_string());
                    }
                }
            }
        }
        out
    }

    /// Given the tab names of an uploaded workbook, find a *different* report
    /// type whose expected sheets are all present — the "wrong import type"
    /// hint for files uploaded under the wrong report type.
    pub fn workbook_type_hint(
        &self,
        current: ReportType,
        available_sheets: &[String],
    ) -> Option<ReportType> {
        self.layouts
            .iter()
            .filter(|l| l.report_type != current && l.format == SourceFormat::Workbook)
            .find(|l| {
                l.sheet_names()
                    .iter()
                    .all(|name| available_sheets.iter().any(|s| s == name))
            })
            .map(|l| l.report_type)
    }
}

impl Default for LayoutRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn ozon_orders_fields() -> Vec<FieldRule> {
    use FieldKind::*;
    vec![
        req("Номер заказа", "oz_order_number", Str),
        opt("Номер отправления", "oz_shipment_number", Str),
        opt("Принят в обработку", "oz_accepted_date", Str),
        opt("Статус", "order_status", Str),
        opt("OZON id", "oz_sku", Integer),
        opt("Артикул", "oz_vendor_code", Str),
    ]
}

fn ozon_orders_csv() -> ReportLayout {
    ReportLayout {
        report_type: ReportType::OzonOrders,
        format: SourceFormat::Delimited,
        delimiter: b';',
        sheets: vec![SheetLayout {
            sheet_name: "",
            header_row: 1,
            data_start_row: 2,
            fields: ozon_orders_fields(),
        }],
        merge_key: None,
    }
}

fn ozon_products_fields() -> Vec<FieldRule> {
    use FieldKind::*;
    vec![
        code("Артикул", "oz_vendor_code"),
        opt("Ozon Product ID", "oz_product_id", Integer),
        opt("SKU", "oz_sku", BigInt),
        opt("Бренд", "oz_brand", Str),
        opt("Статус товара", "oz_product_status", Str),
        opt("Видимость на Ozon", "oz_product_visible", Str),
        opt("Причины скрытия", "oz_hiding_reasons", Str),
        opt("Доступно к продаже по схеме FBO, шт.", "oz_fbo_stock", Integer),
        opt("Текущая цена с учетом скидки, ₽", "oz_actual_price", Decimal),
    ]
}

fn ozon_products_csv() -> ReportLayout {
    ReportLayout {
        report_type: ReportType::OzonProducts,
        format: SourceFormat::Delimited,
        delimiter: b';',
        sheets: vec![SheetLayout {
            sheet_name: "",
            header_row: 1,
            data_start_row: 2,
            fields: ozon_products_fields(),
        }],
        merge_key: None,
    }
}

fn ozon_products_xlsx() -> ReportLayout {
    ReportLayout {
        report_type: ReportType::OzonProducts,
        format: SourceFormat::Workbook,
        delimiter: b';',
        sheets: vec![SheetLayout {
            sheet_name: "Товары и цены",
            header_row: 3,
            data_start_row: 5,
            fields: ozon_products_fields(),
        }],
        merge_key: None,
    }
}

fn ozon_barcodes_xlsx() -> ReportLayout {
    use FieldKind::*;
    ReportLayout {
        report_type: ReportType::OzonBarcodes,
        format: SourceFormat::Workbook,
        delimiter: b';',
        sheets: vec![SheetLayout {
            sheet_name: "Штрихкоды",
            header_row: 3,
            data_start_row: 5,
            fields: vec![
                req("Артикул", "oz_vendor_code", Str),
                opt("Ozon Product ID", "oz_product_id", Integer),
                req("Штрихкод", "oz_barcode", Str),
            ],
        }],
        merge_key: None,
    }
}

fn ozon_category_products_xlsx() -> ReportLayout {
    use FieldKind::*;
    ReportLayout {
        report_type: ReportType::OzonCategoryProducts,
        format: SourceFormat::Workbook,
        delimiter: b';',
        sheets: vec![
            SheetLayout {
                sheet_name: "Шаблон",
                header_row: 2,
                data_start_row: 4,
                fields: vec![
                    code("Артикул*", "oz_vendor_code"),
                    opt("Название товара", "product_name", Str),
                    opt("Цена, руб.*", "oz_actual_price", Decimal),
                    opt("Цена до скидки, руб.", "oz_price_before_discount", Decimal),
                    opt("НДС, %*", "vat_percent", Integer),
                    opt("Баллы за отзывы", "review_points", Integer),
                    opt("SKU", "oz_sku", BigInt),
                    opt("Штрихкод (Серийный номер / EAN)", "barcode", Str),
                    opt("Вес в упаковке, г*", "package_weight_g", Integer),
                    opt("Ширина упаковки, мм*", "package_width_mm", Integer),
                    opt("Высота упаковки, мм*", "package_height_mm", Integer),
                    opt("Длина упаковки, мм*", "package_length_mm", Integer),
                    opt("Ссылка на главное фото*", "main_photo_url", Str),
                    opt("Бренд в одежде и обуви*", "oz_brand", Str),
                    opt("Объединить на одной карточке*", "merge_on_card", Str),
                    opt("Тип*", "product_type", Str),
                    opt("Пол*", "gender", Str),
                    opt("Сезон", "season", Str),
                    opt("Цвет товара*", "color", Str),
                    opt("Российский размер*", "russian_size", Str),
                    opt("Rich-контент JSON", "rich_content_json", Json),
                    opt("Признак 18+", "is_18plus", Boolean),
                    opt("Ортопедический", "orthopedic", Boolean),
                    opt("Непромокаемые", "waterproof", Boolean),
                    opt("Таблица размеров JSON", "size_table_json", Json),
                    opt("Страна-изготовитель", "country_of_origin", Str),
                    opt("Ошибка", "error_message", Str),
                    opt("Предупреждение", "warning_message", Str),
                ],
            },
            SheetLayout {
                sheet_name: "Озон.Видео",
                header_row: 2,
                data_start_row: 4,
                fields: vec![
                    code("Артикул*", "oz_vendor_code"),
                    opt("Озон.Видео: название", "video_name", Str),
                    opt("Озон.Видео: ссылка", "video_link", Str),
                    opt("Озон.Видео: товары на видео", "products_on_video", Str),
                ],
            },
            SheetLayout {
                sheet_name: "Озон.Видеообложка",
                header_row: 2,
                data_start_row: 4,
                fields: vec![
                    code("Артикул*", "oz_vendor_code"),
                    opt("Озон.Видеообложка: ссылка", "video_cover_link", Str),
                ],
            },
        ],
        merge_key: Some("Артикул*"),
    }
}

fn wb_products_xlsx() -> ReportLayout {
    use FieldKind::*;
    ReportLayout {
        report_type: ReportType::WbProducts,
        format: SourceFormat::Workbook,
        delimiter: b';',
        sheets: vec![SheetLayout {
            sheet_name: "Товары",
            header_row: 3,
            data_start_row: 5,
            fields: vec![
                req("Артикул WB", "wb_sku", BigInt),
                opt("Категория продавца", "wb_category", Str),
                opt("Бренд", "wb_brand", Str),
                opt("Баркод", "wb_barcodes", Str),
                opt("Размер", "wb_size", Str),
            ],
        }],
        merge_key: None,
    }
}

fn wb_prices_xlsx() -> ReportLayout {
    use FieldKind::*;
    ReportLayout {
        report_type: ReportType::WbPrices,
        format: SourceFormat::Workbook,
        delimiter: b';',
        sheets: vec![SheetLayout {
            sheet_name: "Отчет - цены и скидки на товары",
            header_row: 1,
            data_start_row: 2,
            fields: vec![
                req("Артикул WB", "wb_sku", BigInt),
                opt("Остатки WB", "wb_fbo_stock", Integer),
            ],
        }],
        merge_key: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_picks_layout_by_type_and_extension() {
        let registry = LayoutRegistry::new();
        let layout = registry.resolve(ReportType::OzonProducts, "csv").unwrap();
        assert_eq!(layout.format, SourceFormat::Delimited);
        let layout = registry.resolve(ReportType::OzonProducts, "XLSX").unwrap();
        assert_eq!(layout.format, SourceFormat::Workbook);
    }

    #[test]
    fn resolve_rejects_unregistered_combinations() {
        let registry = LayoutRegistry::new();
        let err = registry.resolve(ReportType::OzonOrders, "xlsx").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("unsupported file format"));
        assert!(msg.contains("csv"));
    }

    #[test]
    fn merged_fields_dedupe_the_merge_key() {
        let registry = LayoutRegistry::new();
        let layout = registry
            .resolve(ReportType::OzonCategoryProducts, "xlsx")
            .unwrap();
        let fields = layout.merged_fields();
        let key_count = fields
            .iter()
            .filter(|f| f.canonical == "oz_vendor_code")
            .count();
        assert_eq!(key_count, 1);
        assert!(fields.iter().any(|f| f.canonical == "video_cover_link"));
    }

    #[test]
    fn workbook_hint_finds_matching_other_type() {
        let registry = LayoutRegistry::new();
        let sheets = vec![
            "Шаблон".to_string(),
            "Озон.Видео".to_string(),
            "Озон.Видеообложка".to_string(),
        ];
        let hint = registry.workbook_type_hint(ReportType::OzonProducts, &sheets);
        assert_eq!(hint, Some(ReportType::OzonCategoryProducts));
    }
}
