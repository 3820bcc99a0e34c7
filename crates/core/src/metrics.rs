//! 메트릭 상수
//!
//! 모든 메트릭의 이름을 중앙에서 정의합니다.
//! 파이프라인은 이 상수로 `metrics::counter!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `logflume_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// sink 이름 레이블 키
pub const LABEL_SINK: &str = "sink";

/// 미들웨어 스테이지 이름 레이블 키
pub const LABEL_STAGE: &str = "stage";

/// 알림 규칙 이름 레이블 키
pub const LABEL_RULE: &str = "rule";

/// 실패 종류 레이블 키 (stage, delivery, alert_callback)
pub const LABEL_KIND: &str = "kind";

// ─── 엔진 메트릭 ───────────────────────────────────────────────────

/// 엔진에 유입된 레코드 수 (counter)
pub const RECORDS_EMITTED_TOTAL: &str = "logflume_records_emitted_total";

/// 레벨 필터 또는 미들웨어에서 드롭된 레코드 수 (counter)
pub const RECORDS_DROPPED_TOTAL: &str = "logflume_records_dropped_total";

/// sink 큐에 전달된 레코드 수 (counter, label: sink)
pub const RECORDS_DISPATCHED_TOTAL: &str = "logflume_records_dispatched_total";

// ─── 컴포넌트 메트릭 ───────────────────────────────────────────────

/// 샘플링으로 드롭된 레코드 수 (counter)
pub const SAMPLING_DROPPED_TOTAL: &str = "logflume_sampling_dropped_total";

/// 발생한 알림 수 (counter, label: rule)
pub const ALERTS_FIRED_TOTAL: &str = "logflume_alerts_fired_total";

/// 배치 플러시 횟수 (counter, label: sink)
pub const BATCH_FLUSHES_TOTAL: &str = "logflume_batch_flushes_total";

/// 진단 채널로 보고된 실패 수 (counter, label: kind)
pub const DIAGNOSTICS_TOTAL: &str = "logflume_diagnostics_total";
