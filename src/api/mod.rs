pub mod member_cluster;
