pub mod capture {
    pub mod domain {
        pub mod capture_device;
        pub mod frame;
        pub mod frame_pool;
        pub mod frame_source;
    }
    pub mod infrastructure;
}

pub mod conversion {
    pub mod raw_buffer;
}

pub mod pipeline {
    pub mod frame_pull_loop;
    pub mod infrastructure;
    pub mod pipeline_config;
    pub mod pipeline_error;
    pub mod pipeline_handle;
    pub mod pipeline_logger;
    pub mod pipeline_state;
    pub mod start_pipeline_use_case;
}

pub mod processing {
    pub mod domain {
        pub mod frame_processor;
        pub mod processor_slot;
    }
    pub mod infrastructure;
}

pub mod shared {
    pub mod color;
    pub mod constants;
}

pub mod surface {
    pub mod canvas;
    pub mod offscreen_surface;
}

pub mod transfer {
    pub mod transfer_channel;
}
