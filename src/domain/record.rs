//! Source record model
//!
//! [`ErpRecord`] is the validated form of one row of the ERP BOM consolidation
//! feed. Fetched JSON is parsed and checked once, at the ingestion boundary;
//! everything downstream of the ingestion store works with this type.
//! [`RawRecord`] is the persisted ingestion-store row.

use super::ids::{NaturalKey, RecordId};
use super::values::{ErpDecimal, ErpInt, ErpTimestamp};
use crate::domain::{ErpSyncError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One validated row of the ERP feed
///
/// Field names serialize to the upper-snake names used by the source API and
/// by the downstream collection. Unknown source fields are dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct ErpRecord {
    pub txn_type: Option<String>,

    // Customer order
    pub cust_order_id: Option<String>,
    pub cust_order_line_no: Option<ErpInt>,
    pub cust_order_date: Option<ErpTimestamp>,
    pub cust_order_want_date: Option<ErpTimestamp>,
    pub cust_order_line_want_date: Option<ErpTimestamp>,
    pub cust_order_status: Option<String>,

    // Work order
    pub wo_assmb_part_id: Option<String>,
    pub wo_assmb_qty: Option<ErpDecimal>,
    pub wo_create_date: Option<ErpTimestamp>,
    pub wo_rls_date: Option<ErpTimestamp>,
    pub wo_want_date: Option<ErpTimestamp>,
    pub wo_close_date: Option<ErpTimestamp>,
    pub wo_status: Option<String>,
    pub wo_product_code: Option<String>,
    pub wo_asw_status: Option<String>,

    // Bill of materials line
    pub bom_workorder_type: Option<String>,
    pub bom_workorder_base_id: Option<String>,
    pub bom_workorder_lot_id: Option<String>,
    pub bom_workorder_split_id: Option<String>,
    pub bom_workorder_sub_id: Option<String>,
    pub bom_operation_seq_no: Option<ErpInt>,
    pub bom_piece_no: Option<ErpInt>,
    pub bom_part_id: Option<String>,
    pub bom_qty: Option<ErpDecimal>,

    // Part master
    pub part_is_manufacture: Option<String>,
    pub part_category: Option<String>,
    pub part_qty_on_hand_whole: Option<ErpDecimal>,
    pub part_qty_on_order_whole: Option<ErpDecimal>,
    pub part_qty_in_demand_whole: Option<ErpDecimal>,
    pub part_leadtime_days: Option<ErpDecimal>,

    // Purchase requisition
    pub purc_req_id: Option<String>,
    pub purc_req_line_no: Option<ErpInt>,
    pub purc_req_part_id: Option<String>,
    pub purc_req_qty: Option<ErpDecimal>,
    pub purc_req_date: Option<ErpTimestamp>,
    pub purc_req_want_date: Option<ErpTimestamp>,

    // Purchase order
    pub purc_order_id: Option<String>,
    pub po_line_no: Option<ErpInt>,
    pub po_qty: Option<ErpDecimal>,
    pub purc_order_date: Option<ErpTimestamp>,
    pub purc_order_status: Option<String>,
    pub po_want_date: Option<ErpTimestamp>,
    pub po_etd: Option<ErpTimestamp>,
    pub po_eta: Option<ErpTimestamp>,

    // Goods receipt
    pub grn_id: Option<String>,
    pub grn_line_no: Option<ErpInt>,
    pub grn_qty: Option<ErpDecimal>,
    pub grn_inspect_qty: Option<ErpDecimal>,
    pub grn_rejected_qty: Option<ErpDecimal>,
    pub grn_date: Option<ErpTimestamp>,
    pub grn_create_date: Option<ErpTimestamp>,
    pub grn_inspection_date: Option<ErpTimestamp>,

    // Inventory transaction
    pub inv_trans_id: Option<ErpInt>,
    pub inv_trans_part_id: Option<String>,
    pub inv_trans_type: Option<String>,
    pub inv_trans_class: Option<String>,
    pub inv_trans_qty: Option<ErpDecimal>,
    pub inv_trans_date: Option<ErpTimestamp>,
    pub inv_trans_create_date: Option<ErpTimestamp>,
}

/// The three fields that identify a BOM line across fetches
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompositeKey {
    pub order_id: String,
    pub line_no: i64,
    pub part_id: String,
}

impl CompositeKey {
    /// Field/value pairs in the order the downstream filter expects
    pub fn fields(&self) -> [(&'static str, String); 3] {
        [
            ("CUST_ORDER_ID", self.order_id.clone()),
            ("CUST_ORDER_LINE_NO", self.line_no.to_string()),
            ("BOM_PART_ID", self.part_id.clone()),
        ]
    }

    /// Ingestion-store key, `{order}-{line}-{part}`
    pub fn natural_key(&self) -> Result<NaturalKey> {
        NaturalKey::new(format!("{}-{}-{}", self.order_id, self.line_no, self.part_id))
            .map_err(ErpSyncError::Validation)
    }
}

impl ErpRecord {
    /// Parses and validates one fetched item
    ///
    /// # Errors
    ///
    /// Returns [`ErpSyncError::Validation`] when the item is not an object of
    /// the expected shape, a natural-key field is missing or blank, or a
    /// required work-order field is absent.
    pub fn from_source(item: &Value) -> Result<Self> {
        if !item.is_object() {
            return Err(ErpSyncError::Validation(format!(
                "expected a JSON object, got {}",
                json_type(item)
            )));
        }

        let record: ErpRecord = serde_json::from_value(item.clone())
            .map_err(|e| ErpSyncError::Validation(format!("malformed record: {e}")))?;

        record.composite_key()?;
        record.check_required()?;
        Ok(record)
    }

    /// Rebuilds a record from a stored payload
    ///
    /// # Errors
    ///
    /// Returns [`ErpSyncError::Transform`] if the payload no longer matches
    /// the record schema.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let record: ErpRecord = serde_json::from_value(payload.clone())
            .map_err(|e| ErpSyncError::Transform(format!("stored payload is invalid: {e}")))?;
        record
            .check_required()
            .map_err(|e| ErpSyncError::Transform(e.to_string()))?;
        Ok(record)
    }

    /// Returns the order/line/part triple, rejecting blank or zero values
    pub fn composite_key(&self) -> Result<CompositeKey> {
        let order_id = non_blank(self.cust_order_id.as_deref())
            .ok_or_else(|| missing("CUST_ORDER_ID"))?;
        let line_no = self
            .cust_order_line_no
            .map(|n| n.value())
            .filter(|n| *n != 0)
            .ok_or_else(|| missing("CUST_ORDER_LINE_NO"))?;
        let part_id =
            non_blank(self.bom_part_id.as_deref()).ok_or_else(|| missing("BOM_PART_ID"))?;

        Ok(CompositeKey {
            order_id: order_id.to_string(),
            line_no,
            part_id: part_id.to_string(),
        })
    }

    pub fn natural_key(&self) -> Result<NaturalKey> {
        self.composite_key()?.natural_key()
    }

    /// Canonical JSON stored in the ingestion store and hashed for change detection
    pub fn to_payload(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Document written to the downstream collection
    ///
    /// Every field is present; absent values are `null` so an update clears
    /// values the source has dropped.
    pub fn to_downstream_document(&self) -> Result<Value> {
        serde_json::to_value(self).map_err(|e| ErpSyncError::Transform(e.to_string()))
    }

    fn check_required(&self) -> Result<()> {
        if self.bom_workorder_base_id.is_none() {
            return Err(missing("BOM_WORKORDER_BASE_ID"));
        }
        if self.bom_workorder_sub_id.is_none() {
            return Err(missing("BOM_WORKORDER_SUB_ID"));
        }
        Ok(())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn missing(field: &str) -> ErpSyncError {
    ErpSyncError::Validation(format!("missing required field {field}"))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A row of the ingestion store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: RecordId,
    pub natural_key: NaturalKey,
    pub payload: Value,
    pub content_hash: String,
    pub fetched_at: DateTime<Utc>,
}

impl RawRecord {
    /// Parses the stored payload back into a validated record
    pub fn record(&self) -> Result<ErpRecord> {
        ErpRecord::from_payload(&self.payload)
    }
}

/// Result of an ingestion-store upsert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub record_id: RecordId,
    /// True only when an existing row's content hash changed
    pub changed: bool,
}
