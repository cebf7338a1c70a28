pub mod dispatcher;
pub mod group;
pub mod listener;
pub mod planner;
