pub mod doctor;
pub mod flow_cmd;
pub mod generate;
pub mod inspect;
