pub mod shared {
    pub mod bounding_box;
    pub mod config;
    pub mod constants;
    pub mod frame;
    pub mod image;
}

pub mod pipeline {
    pub mod cancellation;
    pub mod control;
    pub mod handoff_queue;
    pub mod pipeline_orchestrator;
    pub mod pipeline_report;
    pub mod preprocess_stage;
    pub mod stage_stats;
    pub mod tracking_stage;
}

pub mod detection {
    pub mod domain {
        pub mod detector;
        pub mod tracker;
    }
    pub mod infrastructure;
}

pub mod video {
    pub mod domain {
        pub mod display;
        pub mod frame_source;
    }
    pub mod infrastructure;
}
