pub mod curriculum;
pub mod work_plan;
